use std::net::SocketAddr;
use std::time::Duration;
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
    pub bind_address: SocketAddr,
    pub openai_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub chat_model: String,
    pub coach_max_tokens: u32,
    pub collaborator_timeout: Duration,
    pub cors_origin: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// A `.env` file in the current directory is honoured. Recognised variables:
    ///
    /// *   `BIND_ADDRESS`: Address and port to bind to. Defaults to "0.0.0.0:8000".
    /// *   `OPENAI_API_KEY`: Key for coaching messages. Without it every message is the fallback line.
    /// *   `ELEVENLABS_API_KEY`: Key for the spoken welcome. Without it `/start` reports an error status.
    /// *   `CHAT_MODEL`: Chat model for coaching messages. Defaults to "gpt-4o-mini".
    /// *   `COACH_MAX_TOKENS`: Output bound for coaching messages. Defaults to 100.
    /// *   `COLLABORATOR_TIMEOUT_SECS`: Timeout for provider calls. Defaults to 15.
    /// *   `CORS_ORIGIN`: Allowed browser origin, or "*". Defaults to "http://localhost:5173".
    /// *   `RUST_LOG`: The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        let elevenlabs_api_key = lookup("ELEVENLABS_API_KEY").filter(|k| !k.trim().is_empty());

        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        if chat_model.trim().is_empty() {
            return Err(ConfigError::MissingVar("CHAT_MODEL must not be empty".to_string()));
        }

        let coach_max_tokens = parse_or("COACH_MAX_TOKENS", lookup("COACH_MAX_TOKENS"), 100u32)?;
        let timeout_secs = parse_or(
            "COLLABORATOR_TIMEOUT_SECS",
            lookup("COLLABORATOR_TIMEOUT_SECS"),
            15u64,
        )?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            elevenlabs_api_key,
            chat_model,
            coach_max_tokens,
            collaborator_timeout: Duration::from_secs(timeout_secs),
            cors_origin,
            log_level,
        })
    }

    /// Logs which providers will run degraded.
    pub fn warn_missing_credentials(&self) {
        if self.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set, coaching messages will use the fallback line");
        }
        if self.elevenlabs_api_key.is_none() {
            tracing::warn!("ELEVENLABS_API_KEY not set, the spoken welcome is unavailable");
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("'{raw}' is not a valid number"))
        }),
    }
}
