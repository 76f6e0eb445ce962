use std::path::PathBuf;

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Root configuration for the Fit Track backend.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FitTrackConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub reminders: RemindersConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Externally reachable origin, used to build the OAuth `redirect_to`.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8787,
            public_url: "http://127.0.0.1:8787".into(),
        }
    }
}

/// Identity provider (Supabase Auth) settings and callback behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub supabase_url: String,
    pub anon_key: Option<Secret<String>>,
    /// Where a successful callback lands when `next` is missing or unsafe.
    pub default_next: String,
    /// Error page path, `/login` or `/auth/error`.
    pub error_page: String,
    pub exchange_timeout_secs: u64,
    /// How long a code stays in the consumed-code ledger.
    pub consumed_ttl_secs: u64,
    /// Social providers offered on the login page.
    pub providers: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            anon_key: None,
            default_next: "/home".into(),
            error_page: "/login".into(),
            exchange_timeout_secs: 15,
            consumed_ttl_secs: 600,
            providers: vec!["google".into(), "apple".into()],
        }
    }
}

/// Reminder loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindersConfig {
    pub tick_interval_secs: u64,
    /// A reminder still fires this long after its scheduled time.
    pub catch_up_minutes: u32,
    /// Defaults to `<data dir>/reminders.json`.
    pub store_path: Option<PathBuf>,
    /// Start the loop when the gateway boots, if reminders are enabled.
    pub autostart: bool,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            catch_up_minutes: 15,
            store_path: None,
            autostart: true,
        }
    }
}
