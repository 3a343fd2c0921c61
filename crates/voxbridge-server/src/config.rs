//! Server configuration loading from file and environment variables.

use crate::delivery::DeliveryMode;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use thiserror::Error;
use voxbridge_voice::SpeechConfig;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Remote speech service settings.
    #[serde(default)]
    pub speech: SpeechConfig,

    /// How synthesized audio is handed back to clients.
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the browser client, served as the router fallback.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "voxbridge_voice=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Result delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// `url` persists audio and returns a link; `base64` returns it inline.
    #[serde(default)]
    pub mode: DeliveryMode,

    /// Directory persisted audio is written to in `url` mode.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,

    /// Public path prefix persisted audio is served under.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from("public/audio")
}

fn default_url_prefix() -> String {
    "/audio".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::default(),
            audio_dir: default_audio_dir(),
            url_prefix: default_url_prefix(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VOXBRIDGE_HOST` overrides `server.host`
/// - `VOXBRIDGE_PORT` overrides `server.port`
/// - `VOXBRIDGE_LOG_LEVEL` overrides `logging.level`
/// - `VOXBRIDGE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `VOXBRIDGE_DELIVERY_MODE` overrides `delivery.mode` (`url` or `base64`)
/// - `VOXBRIDGE_AUDIO_DIR` overrides `delivery.audio_dir`
/// - `VOXBRIDGE_FFMPEG` overrides `speech.transcoder.ffmpeg_binary`
/// - `DASHSCOPE_API_KEY` supplies `speech.api_key`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Applies overrides from `lookup`, ignoring values that fail to parse.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("VOXBRIDGE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("VOXBRIDGE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = lookup("VOXBRIDGE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("VOXBRIDGE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(mode) = lookup("VOXBRIDGE_DELIVERY_MODE") {
        match mode.parse() {
            Ok(parsed) => config.delivery.mode = parsed,
            Err(e) => tracing::warn!(value = %mode, "ignoring VOXBRIDGE_DELIVERY_MODE: {}", e),
        }
    }
    if let Some(dir) = lookup("VOXBRIDGE_AUDIO_DIR") {
        config.delivery.audio_dir = PathBuf::from(dir);
    }
    if let Some(ffmpeg) = lookup("VOXBRIDGE_FFMPEG") {
        config.speech.transcoder.ffmpeg_binary = PathBuf::from(ffmpeg);
    }
    if let Some(key) = lookup("DASHSCOPE_API_KEY") {
        config.speech.api_key = key;
    }
}
