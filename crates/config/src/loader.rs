use std::path::{Path, PathBuf};

use {
    anyhow::{Context, bail},
    secrecy::Secret,
    tracing::{debug, info},
};

use crate::schema::FitTrackConfig;

const CONFIG_STEM: &str = "fittrack";
const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "yaml", "yml", "json"];

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "fittrack", "fittrack")
}

/// Per-user data directory (`~/.local/share/fittrack` on Linux).
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().to_path_buf())
}

/// Find the first config file, checking `cwd` before the user config dir.
pub fn discover_config_file(cwd: &Path) -> Option<PathBuf> {
    let mut dirs = vec![cwd.to_path_buf()];
    if let Some(pd) = project_dirs() {
        dirs.push(pd.config_dir().to_path_buf());
    }

    dirs.iter()
        .flat_map(|dir| {
            CONFIG_EXTENSIONS
                .iter()
                .map(move |ext| dir.join(format!("{CONFIG_STEM}.{ext}")))
        })
        .find(|p| p.is_file())
}

/// Parse config content, choosing the format from the file extension.
pub fn parse_config(content: &str, extension: &str) -> anyhow::Result<FitTrackConfig> {
    let config = match extension {
        "toml" => toml::from_str(content).context("invalid TOML config")?,
        "yaml" | "yml" => serde_yaml::from_str(content).context("invalid YAML config")?,
        "json" => serde_json::from_str(content).context("invalid JSON config")?,
        other => bail!("unsupported config format: .{other}"),
    };
    Ok(config)
}

/// Apply `FITTRACK_*` overrides using the given variable lookup.
pub fn apply_env_overrides(config: &mut FitTrackConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("FITTRACK_SUPABASE_URL") {
        config.auth.supabase_url = url;
    }
    if let Some(key) = lookup("FITTRACK_SUPABASE_ANON_KEY") {
        config.auth.anon_key = Some(Secret::new(key));
    }
    if let Some(url) = lookup("FITTRACK_PUBLIC_URL") {
        config.server.public_url = url;
    }
}

/// Load configuration from `explicit` or the discovered file, then apply
/// environment overrides. A missing file yields the defaults.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<FitTrackConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => discover_config_file(&std::env::current_dir()?),
    };

    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("toml");
            let config = parse_config(&content, ext)
                .with_context(|| format!("failed to load {}", path.display()))?;
            info!(path = %path.display(), "loaded config");
            config
        },
        None => {
            debug!("no config file found, using defaults");
            FitTrackConfig::default()
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}
