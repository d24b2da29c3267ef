//! Relay configuration
//!
//! Loaded from a TOML file. Every field has a default, so a partial file (or
//! an empty one) is valid. Without an explicit path the file lives at
//! `~/.config/joyrelay/relay.toml` and is created with defaults on first run.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};

use crate::controller::reader::DEFAULT_DEVICE_NAME;
use crate::controller::ReaderSettings;
use crate::telemetry::PublisherSettings;

const CONFIG_DIR: &str = ".config/joyrelay";
const CONFIG_FILE: &str = "relay.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub device: DeviceConfig,
    pub telemetry: TelemetryConfig,
    pub console: ConsoleConfig,
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Exact display name of the gamepad
    pub name: String,
    /// Pause between discovery passes and after a disconnect
    pub retry_interval_ms: u64,
    /// Radial stick deadzone, 0.0 - 1.0
    pub deadzone: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let reader = ReaderSettings::default();
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            retry_interval_ms: reader.retry_interval.as_millis() as u64,
            deadzone: 0.14,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub publish_addr: SocketAddr,
    pub control_addr: SocketAddr,
    /// Messages per second
    pub message_rate: u32,
    pub receive_timeout_ms: u64,
    /// Publish neutral input while no gamepad is attached instead of going quiet
    pub publish_when_disconnected: bool,
    pub stats_interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let publisher = PublisherSettings::default();
        Self {
            publish_addr: publisher.publish_addr,
            control_addr: publisher.control_addr,
            message_rate: publisher.message_rate,
            receive_timeout_ms: publisher.receive_timeout.as_millis() as u64,
            publish_when_disconnected: publisher.publish_when_disconnected,
            stats_interval_secs: publisher.stats_interval.as_secs(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Read `active` / `trot` commands from stdin
    pub enabled: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.name.trim().is_empty() {
            return Err(ConfigError::Invalid("device.name must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.device.deadzone) {
            return Err(ConfigError::Invalid(format!(
                "device.deadzone must be within 0.0 and 1.0, got {}",
                self.device.deadzone
            )));
        }
        if self.telemetry.message_rate == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.message_rate must be positive".into(),
            ));
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        self.logging
            .level
            .parse::<Level>()
            .map_err(|_| {
                ConfigError::Invalid(format!("unknown log level '{}'", self.logging.level))
            })
    }

    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            device_name: self.device.name.clone(),
            retry_interval: Duration::from_millis(self.device.retry_interval_ms),
            deadzone: self.device.deadzone as f32,
        }
    }

    /// Publisher settings with the receive timeout kept under half a period
    pub fn publisher_settings(&self) -> PublisherSettings {
        let mut settings = PublisherSettings {
            publish_addr: self.telemetry.publish_addr,
            control_addr: self.telemetry.control_addr,
            message_rate: self.telemetry.message_rate,
            receive_timeout: Duration::from_millis(self.telemetry.receive_timeout_ms),
            publish_when_disconnected: self.telemetry.publish_when_disconnected,
            stats_interval: Duration::from_secs(self.telemetry.stats_interval_secs.max(1)),
        };

        let limit = settings.period() / 2;
        if settings.receive_timeout > limit {
            warn!(
                "receive_timeout_ms {} exceeds half the publish period, using {:?}",
                self.telemetry.receive_timeout_ms, limit
            );
            settings.receive_timeout = limit;
        }
        settings
    }

    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content)
    }

    /// Writes a default config to `path` unless one is already there
    pub async fn ensure_default_config(path: &Path) -> Result<(), ConfigError> {
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if tokio::fs::try_exists(path).await.map_err(io_err)? {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, RelayConfig::default().to_toml()?)
            .await
            .map_err(io_err)?;
        info!("Wrote default config to {}", path.display());
        Ok(())
    }

    /// Loads from `explicit` if given, else from the default location
    pub async fn load(explicit: Option<PathBuf>) -> Result<(Self, PathBuf), ConfigError> {
        let path = match explicit {
            Some(path) => path,
            None => {
                let path = default_config_path();
                Self::ensure_default_config(&path).await?;
                path
            }
        };
        let config = Self::load_from(&path).await?;
        Ok((config, path))
    }
}

pub fn default_config_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    });
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::snapshot::DEFAULT_DEADZONE;

    #[test]
    fn defaults_match_relay_constants() {
        let config = RelayConfig::default();
        assert_eq!(config.device.name, "Logitech Gamepad F710");
        assert_eq!(config.device.deadzone as f32, DEFAULT_DEADZONE);
        assert_eq!(config.telemetry.publish_addr.port(), 8830);
        assert_eq!(config.telemetry.control_addr.port(), 8840);
        assert_eq!(config.telemetry.message_rate, 20);
        assert!(config.telemetry.publish_when_disconnected);
        assert!(!config.console.enabled);
        assert_eq!(config.log_level().unwrap(), Level::INFO);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(RelayConfig::from_toml("").unwrap(), RelayConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = RelayConfig::from_toml(
            r#"
            [device]
            name = "Sony Interactive Entertainment Wireless Controller"

            [telemetry]
            publish_addr = "10.0.0.7:9000"
            publish_when_disconnected = false
            "#,
        )
        .unwrap();

        assert_eq!(
            config.device.name,
            "Sony Interactive Entertainment Wireless Controller"
        );
        assert_eq!(config.device.retry_interval_ms, 1000);
        assert_eq!(config.telemetry.publish_addr, "10.0.0.7:9000".parse().unwrap());
        assert_eq!(config.telemetry.control_addr.port(), 8840);
        assert!(!config.telemetry.publish_when_disconnected);
    }

    #[test]
    fn default_toml_parses_back() {
        let text = RelayConfig::default().to_toml().unwrap();
        assert!(text.contains("[telemetry]"));
        assert_eq!(RelayConfig::from_toml(&text).unwrap(), RelayConfig::default());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            RelayConfig::from_toml("[telemetry]\nmessage_rate = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RelayConfig::from_toml("[device]\ndeadzone = 1.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RelayConfig::from_toml("[logging]\nlevel = \"loud\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RelayConfig::from_toml("[telemetry]\npublish_addr = \"nowhere\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn receive_timeout_is_clamped_below_period() {
        let config = RelayConfig::from_toml("[telemetry]\nreceive_timeout_ms = 500").unwrap();
        let settings = config.publisher_settings();
        assert_eq!(settings.receive_timeout, Duration::from_millis(25));

        let settings = RelayConfig::default().publisher_settings();
        assert_eq!(settings.receive_timeout, Duration::from_millis(10));
    }

    #[test]
    fn reader_settings_follow_device_section() {
        let config =
            RelayConfig::from_toml("[device]\nretry_interval_ms = 250\ndeadzone = 0.2").unwrap();
        let settings = config.reader_settings();
        assert_eq!(settings.retry_interval, Duration::from_millis(250));
        assert_eq!(settings.deadzone, 0.2);
    }

    #[tokio::test]
    async fn creates_default_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        RelayConfig::ensure_default_config(&path).await.unwrap();
        assert_eq!(RelayConfig::load_from(&path).await.unwrap(), RelayConfig::default());

        tokio::fs::write(&path, "[console]\nenabled = true\n").await.unwrap();
        RelayConfig::ensure_default_config(&path).await.unwrap();
        let (config, loaded_from) = RelayConfig::load(Some(path.clone())).await.unwrap();
        assert!(config.console.enabled);
        assert_eq!(loaded_from, path);
    }

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            RelayConfig::load(Some(missing)).await,
            Err(ConfigError::Io { .. })
        ));
    }
}
