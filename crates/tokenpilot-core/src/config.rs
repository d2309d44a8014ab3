//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the fixed limits shared by the renderer, keyboard and transport layers.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Maximum rendered message length.
/// Telegram's official limit is 4096, we keep a margin for markup.
pub const MESSAGE_LENGTH_LIMIT: usize = 4000;

/// Maximum callback payload length in bytes (Telegram limit).
pub const CALLBACK_DATA_LIMIT: usize = 64;

/// Telegram API retry: maximum attempts
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Telegram API retry: initial backoff in milliseconds
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Telegram API retry: maximum backoff in milliseconds
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

/// Capacity of the stage event channel between backend and relay
pub const STAGE_CHANNEL_CAPACITY: usize = 64;

/// Core settings shared by every transport.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoreSettings {
    /// Path to the SQLite database (`:memory:` is accepted)
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Conversational backend endpoint
    pub backend_url: Option<String>,
    /// Bearer token sent to the backend
    pub backend_api_key: Option<String>,
    /// Timeout of a single backend call in seconds
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,

    /// Base URL used for block-explorer link buttons
    #[serde(default = "default_explorer_base_url")]
    pub explorer_base_url: String,

    /// Append the error chain to user-visible apology messages
    #[serde(default)]
    pub debug_errors: bool,
    /// Echo the raw backend result as a preformatted block
    #[serde(default)]
    pub echo_result: bool,
}

fn default_database_path() -> String {
    "data/tokenpilot.db".to_string()
}

const fn default_backend_timeout_secs() -> u64 {
    120
}

fn default_explorer_base_url() -> String {
    "https://solscan.io".to_string()
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            backend_url: None,
            backend_api_key: None,
            backend_timeout_secs: default_backend_timeout_secs(),
            explorer_base_url: default_explorer_base_url(),
            debug_errors: false,
            echo_result: false,
        }
    }
}

/// Build the layered configuration used by every settings struct.
///
/// Sources, later ones win: `config/default`, `config/{RUN_MODE}`,
/// `config/local`, `APP__*` variables, plain environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Environment::default() maps UPPER_SNAKE_CASE to snake_case; empty values count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl CoreSettings {
    /// Load settings from files and environment.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tokenpilot_core::config::CoreSettings;
    ///
    /// let settings = CoreSettings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Returns the backend URL, failing with a config error if it is missing.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` when `BACKEND_URL` is not configured.
    pub fn require_backend_url(&self) -> Result<&str, ConfigError> {
        self.backend_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::NotFound("backend_url".to_string()))
    }
}
