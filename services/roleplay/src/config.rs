use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Websocket endpoint of the role-play counterpart.
    pub counterpart_url: String,
    pub api_key: Option<String>,
    /// Role tag sent to the counterpart in the init record.
    pub role: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let counterpart_url = std::env::var("ROLEPLAY_URL")
            .map_err(|_| ConfigError::MissingVar("ROLEPLAY_URL".to_string()))?;
        if !(counterpart_url.starts_with("ws://") || counterpart_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(
                "ROLEPLAY_URL".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", counterpart_url),
            ));
        }

        let api_key = std::env::var("ROLEPLAY_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let role = std::env::var("ROLEPLAY_ROLE").unwrap_or_else(|_| "doctor".to_string());
        if role.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "ROLEPLAY_ROLE".to_string(),
                "role must not be empty".to_string(),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            counterpart_url,
            api_key,
            role,
            log_level,
        })
    }
}
