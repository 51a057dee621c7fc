//! Configuration file parsing and structures.
//!
//! ohmd is configured with a single TOML file. Every monitored
//! OpenHardwareMonitor endpoint gets its own named table under
//! `[integrations.openhardwaremonitor]`; the MQTT bridge and the HTTP API are
//! optional sections.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

/// Port OpenHardwareMonitor's remote web server listens on by default
pub const DEFAULT_OHM_PORT: u16 = 8085;

/// Seconds between two refresh cycles
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 30;

/// Seconds before a fetch of `data.json` is abandoned
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub api: Option<ApiConfig>,

    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"ohmd::integrations" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the subscriber filter for this logging configuration
    pub fn targets(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        )
    }
}

/// Native HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8565
}

/// Integration configuration container
#[derive(Debug, Default, Deserialize)]
pub struct IntegrationsConfig {
    /// OpenHardwareMonitor endpoints, keyed by instance name
    #[serde(default)]
    pub openhardwaremonitor: HashMap<String, OhmConfig>,

    /// MQTT bridge republishing every sensor via Home Assistant discovery
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
}

/// A single OpenHardwareMonitor endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct OhmConfig {
    /// Hostname or IP address of the machine running OpenHardwareMonitor
    pub host: String,

    /// Port of OpenHardwareMonitor's remote web server
    #[serde(default = "default_ohm_port")]
    pub port: u16,

    /// Seconds between refresh cycles
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,

    /// Seconds before a fetch is abandoned
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_ohm_port() -> u16 {
    DEFAULT_OHM_PORT
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl OhmConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_OHM_PORT,
            scan_interval: DEFAULT_SCAN_INTERVAL_SECS,
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// URL of the JSON sensor tree
    pub fn data_url(&self) -> String {
        format!("http://{}:{}/data.json", self.host, self.port)
    }
}

/// MQTT bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address
    pub broker: String,

    /// MQTT broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// MQTT client ID
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Home Assistant discovery prefix (default: "homeassistant")
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,

    /// Prefix of state and attribute topics (default: "ohmd")
    #[serde(default = "default_state_prefix")]
    pub state_prefix: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "ohmd".to_string()
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_state_prefix() -> String {
    "ohmd".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        let config: Config = toml::from_str(&contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, ohm) in &self.integrations.openhardwaremonitor {
            if ohm.host.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field_path: format!("integrations.openhardwaremonitor.{}.host", name),
                    message: "host must not be empty".to_string(),
                });
            }
            if ohm.scan_interval == 0 {
                return Err(ConfigError::Validation {
                    field_path: format!("integrations.openhardwaremonitor.{}.scan_interval", name),
                    message: "scan_interval must be at least 1 second".to_string(),
                });
            }
            if ohm.timeout == 0 {
                return Err(ConfigError::Validation {
                    field_path: format!("integrations.openhardwaremonitor.{}.timeout", name),
                    message: "timeout must be at least 1 second".to_string(),
                });
            }
        }

        if let Some(mqtt) = &self.integrations.mqtt {
            if mqtt.broker.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field_path: "integrations.mqtt.broker".to_string(),
                    message: "broker must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field_path}: {message}")]
    Validation { field_path: String, message: String },
}
