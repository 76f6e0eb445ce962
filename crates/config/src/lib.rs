pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, data_dir, discover_config_file, load_config, parse_config},
    schema::{AuthConfig, FitTrackConfig, RemindersConfig, ServerConfig},
};
