//! Bootstrap configuration loading
//!
//! Configuration file location follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `MOODLIST_CONFIG` environment variable
//! 3. User config file (`~/.config/moodlist/config.toml`)
//! 4. System config file (`/etc/moodlist/config.toml`)
//! 5. Built-in defaults (fallback)
//!
//! A missing config file never terminates startup: a warning is logged and the
//! built-in defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MOODLIST_CONFIG";

/// Environment variable holding the catalog provider client id
pub const CLIENT_ID_ENV_VAR: &str = "SPOTIFY_CLIENT_ID";

/// Environment variable holding the catalog provider client secret
pub const CLIENT_SECRET_ENV_VAR: &str = "SPOTIFY_CLIENT_SECRET";

/// Bootstrap configuration loaded from TOML file
///
/// Every field has a built-in default so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Identity + catalog provider settings
    #[serde(default)]
    pub spotify: SpotifyConfig,

    /// Expression classifier settings
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Frame source settings
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Network and cycle timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            spotify: SpotifyConfig::default(),
            classifier: ClassifierConfig::default(),
            capture: CaptureConfig::default(),
            timeouts: TimeoutConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Identity provider and catalog provider endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    /// Client id (overridden by `SPOTIFY_CLIENT_ID`)
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (overridden by `SPOTIFY_CLIENT_SECRET`)
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Client-credentials token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Catalog API base URL (search lives at `{api_base_url}/search`)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Seconds before declared expiry at which a token stops being handed out
    #[serde(default = "default_token_leeway_secs")]
    pub token_leeway_secs: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            token_leeway_secs: default_token_leeway_secs(),
        }
    }
}

/// Expression classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Directory holding the detector and expression model manifests
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Inference endpoint that scores a single frame
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            endpoint: default_classifier_endpoint(),
        }
    }
}

/// Frame source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Snapshot file kept current by the external capture tool
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

/// Timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Per-request timeout for outbound HTTP calls
    #[serde(default = "default_http_secs")]
    pub http_secs: u64,

    /// Upper bound for one detect cycle (0 disables)
    #[serde(default = "default_cycle_secs")]
    pub cycle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            http_secs: default_http_secs(),
            cycle_secs: default_cycle_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_token_leeway_secs() -> u64 {
    30
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("./models")
}

fn default_classifier_endpoint() -> String {
    "http://127.0.0.1:8501/detect".to_string()
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("/dev/shm/moodlist/frame.jpg")
}

fn default_http_secs() -> u64 {
    10
}

fn default_cycle_secs() -> u64 {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from an optional file path
    ///
    /// `None` or a path that does not exist yields the built-in defaults.
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            warn!("No config file found, using built-in defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// Locate the config file following the priority order in the module docs
///
/// Returns the CLI or environment path even when it does not exist, so the
/// caller can warn about it; discovered default locations are only returned
/// when present.
pub fn locate_config_file(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    if let Some(user_config) = dirs::config_dir().map(|d| d.join("moodlist").join("config.toml")) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    // Priority 4: System config
    let system_config = PathBuf::from("/etc/moodlist/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Client id/secret pair for the client-credentials grant
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Validate a credential value (non-empty, non-whitespace)
pub fn is_valid_credential(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Resolve provider credentials
///
/// **Priority:** ENV → TOML, per field
pub fn resolve_credentials(spotify: &SpotifyConfig) -> Result<ClientCredentials> {
    let client_id = resolve_field(
        "client_id",
        std::env::var(CLIENT_ID_ENV_VAR).ok(),
        spotify.client_id.as_deref(),
    )
    .ok_or_else(|| missing_credential(CLIENT_ID_ENV_VAR, "client_id"))?;

    let client_secret = resolve_field(
        "client_secret",
        std::env::var(CLIENT_SECRET_ENV_VAR).ok(),
        spotify.client_secret.as_deref(),
    )
    .ok_or_else(|| missing_credential(CLIENT_SECRET_ENV_VAR, "client_secret"))?;

    Ok(ClientCredentials {
        client_id,
        client_secret,
    })
}

fn resolve_field(name: &str, env_value: Option<String>, toml_value: Option<&str>) -> Option<String> {
    let env_value = env_value.filter(|v| is_valid_credential(v));
    let toml_value = toml_value.filter(|v| is_valid_credential(v));

    match (env_value, toml_value) {
        (Some(env), Some(_)) => {
            warn!(
                "Provider {} found in both environment and TOML config. Using environment (highest priority).",
                name
            );
            Some(env)
        }
        (Some(env), None) => {
            info!("Provider {} loaded from environment variable", name);
            Some(env)
        }
        (None, Some(toml)) => {
            info!("Provider {} loaded from TOML config", name);
            Some(toml.to_string())
        }
        (None, None) => None,
    }
}

fn missing_credential(env_var: &str, toml_key: &str) -> Error {
    Error::Config(format!(
        "Catalog provider {toml_key} not configured. Please configure using one of:\n\
         1. Environment: {env_var}=...\n\
         2. TOML config: [spotify] {toml_key} = \"...\""
    ))
}
