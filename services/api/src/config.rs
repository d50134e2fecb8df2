use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Optional so the frontend can still load and report a missing key.
    pub gemini_api_key: Option<String>,
    pub chat_model: String,
    pub live_model: String,
    pub data_path: PathBuf,
    pub prompts_path: PathBuf,
    pub static_dir: PathBuf,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());
        let live_model = std::env::var("LIVE_MODEL")
            .unwrap_or_else(|_| gemini_live::DEFAULT_MODEL.to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let data_path = path_var("DATA_PATH", "default_context")?;
        let prompts_path = path_var("PROMPTS_PATH", "./prompts")?;
        let static_dir = path_var("STATIC_DIR", "frontend/dist")?;

        Ok(Self {
            bind_address,
            gemini_api_key,
            chat_model,
            live_model,
            data_path,
            prompts_path,
            static_dir,
            log_level,
        })
    }
}

fn path_var(name: &str, default: &str) -> Result<PathBuf, ConfigError> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Err(ConfigError::InvalidValue(
            name.to_string(),
            "path must not be empty".to_string(),
        )),
        Ok(value) => Ok(PathBuf::from(value)),
        Err(_) => Ok(PathBuf::from(default)),
    }
}
