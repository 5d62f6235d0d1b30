//! Configuration management for toolpilot.
//!
//! Configuration is read from environment variables (a `.env` file in the
//! working directory is loaded first when present):
//! - `TOGETHER_API_KEY` - Required. API key for the hosted model.
//! - `TOGETHER_MODEL` - Optional. Model identifier. Defaults to `mistralai/Mixtral-8x7B-Instruct-v0.1`.
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible endpoint. Defaults to `https://api.together.xyz/v1`.
//! - `LLM_TEMPERATURE` - Optional. Sampling temperature. Defaults to `0.7`.
//! - `LLM_TIMEOUT_SECS` - Optional. Model request timeout. Defaults to `60`.
//! - `WEATHER_API_KEY` - Optional. Key for the weather tool.
//! - `WEATHER_API_URL` - Optional. Weather endpoint. Defaults to OpenWeatherMap.
//! - `WORKSPACE_PATH` - Optional. Base directory for file reads. Defaults to current directory.
//! - `UPLOADS_DIR` - Optional. Upload directory inside the workspace. Defaults to `uploads`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `7860`.
//! - `MAX_UPLOAD_BYTES` - Optional. Request body limit for the chat endpoint. Defaults to 10 MiB.
//! - `MAX_SESSIONS` - Optional. Web conversations kept in memory. Defaults to `500`.
//! - `SESSION_IDLE_SECS` - Optional. Idle time after which a web conversation may be dropped. Defaults to `3600`.
//! - `LOG_LEVEL` - Optional. Log filter used when `RUST_LOG` is unset. Defaults to `info`.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_MODEL: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.together.xyz/v1";
pub const DEFAULT_WEATHER_API_URL: &str = "http://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Hosted model settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Bearer token for the completion endpoint
    pub api_key: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub base_url: String,

    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Settings consumed by the built-in tools.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Weather API key; the weather tool reports its absence as an error result
    pub weather_api_key: Option<String>,

    pub weather_api_url: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            weather_api_key: None,
            weather_api_url: DEFAULT_WEATHER_API_URL.to_string(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,

    pub tools: ToolsConfig,

    /// Base directory for file operations
    pub workspace_path: PathBuf,

    /// Upload directory, relative to the workspace
    pub uploads_dir: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Body limit for multipart chat requests
    pub max_upload_bytes: usize,

    /// Most web conversations held at once; the least recently used goes first
    pub max_sessions: usize,

    /// Web conversations idle longer than this are dropped when a new one starts
    pub session_idle_secs: u64,

    /// Fallback log filter
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `TOGETHER_API_KEY` is not set,
    /// and `ConfigError::InvalidValue` for unparsable numbers.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine; real environment variables still apply.
        let _ = dotenvy::dotenv();

        let api_key = required_api_key(std::env::var("TOGETHER_API_KEY").ok())?;

        let llm = LlmConfig {
            api_key,
            model: std::env::var("TOGETHER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string()),
            temperature: parse_env("LLM_TEMPERATURE", 0.7)?,
            timeout_secs: parse_env("LLM_TIMEOUT_SECS", 60)?,
        };

        let tools = ToolsConfig {
            weather_api_key: std::env::var("WEATHER_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            weather_api_url: std::env::var("WEATHER_API_URL")
                .unwrap_or_else(|_| DEFAULT_WEATHER_API_URL.to_string()),
        };

        let workspace_path = std::env::var("WORKSPACE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let uploads_dir = std::env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string());
        validate_uploads_dir(&uploads_dir)?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env("PORT", 7860)?;
        let max_upload_bytes = parse_env("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?;
        let max_sessions = parse_env("MAX_SESSIONS", 500)?;
        if max_sessions == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_SESSIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let session_idle_secs = parse_env("SESSION_IDLE_SECS", 3600)?;

        let log_level = std::env::var("LOG_LEVEL")
            .map(|v| v.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            llm,
            tools,
            workspace_path,
            uploads_dir,
            host,
            port,
            max_upload_bytes,
            max_sessions,
            session_idle_secs,
            log_level,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, model: String, workspace_path: PathBuf) -> Self {
        Self {
            llm: LlmConfig {
                api_key,
                model,
                base_url: DEFAULT_LLM_BASE_URL.to_string(),
                temperature: 0.7,
                timeout_secs: 60,
            },
            tools: ToolsConfig::default(),
            workspace_path,
            uploads_dir: "uploads".to_string(),
            host: "127.0.0.1".to_string(),
            port: 7860,
            max_upload_bytes: 10 * 1024 * 1024,
            max_sessions: 500,
            session_idle_secs: 3600,
            log_level: "info".to_string(),
        }
    }

    /// Absolute location of the upload directory.
    pub fn uploads_path(&self) -> PathBuf {
        self.workspace_path.join(&self.uploads_dir)
    }

    /// Log filter directive for `tracing_subscriber::EnvFilter` when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> String {
        format!("toolpilot={},tower_http={}", self.log_level, self.log_level)
    }
}

/// The model key must be present and non-blank.
fn required_api_key(raw: Option<String>) -> Result<String, ConfigError> {
    raw.filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar("TOGETHER_API_KEY".to_string()))
}

/// Uploaded files are handed to file_reader, which only accepts workspace-relative paths.
fn validate_uploads_dir(dir: &str) -> Result<(), ConfigError> {
    let path = std::path::Path::new(dir);
    let escapes = path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir));
    if dir.trim().is_empty() || path.is_absolute() || escapes {
        return Err(ConfigError::InvalidValue(
            "UPLOADS_DIR".to_string(),
            "must be a path relative to the workspace".to_string(),
        ));
    }
    Ok(())
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), format!("{}", e)))
}
