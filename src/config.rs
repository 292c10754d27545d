//! Configuration file
//!
//! A single TOML file, by default `<config dir>/robotlink/config.toml`.
//! Every section and key is optional; anything missing falls back to the
//! defaults below. A missing file means all defaults.

use crate::link::connection::RxChecksumPolicy;
use crate::link::scheduler::PackingMode;
use crate::protocol::checksum::ChecksumAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn, Level};

pub const CONFIG_DIR: &str = "robotlink";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub protocol: ProtocolConfig,
    pub latency: LatencyConfig,
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    pub transmit_period_ms: u64,
    pub liveness_timeout_ms: u64,
    pub liveness_check_interval_ms: u64,
    pub open_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "10.0.0.22".to_string(),
            port: 22211,
            transmit_period_ms: 100,
            liveness_timeout_ms: 2000,
            liveness_check_interval_ms: 1000,
            open_timeout_ms: 3000,
        }
    }
}

impl LinkConfig {
    pub fn transmit_period(&self) -> Duration {
        Duration::from_millis(self.transmit_period_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn liveness_check_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_check_interval_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProtocolConfig {
    pub checksum: ChecksumAlgorithm,
    pub rx_checksum: RxChecksumPolicy,
    pub packing: PackingMode,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LatencyConfig {
    /// Number of packet gaps in the rolling average
    pub window: usize,
    pub chart_sample_interval_ms: u64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            window: 50,
            chart_sample_interval_ms: 1000,
        }
    }
}

impl LatencyConfig {
    pub fn chart_sample_interval(&self) -> Duration {
        Duration::from_millis(self.chart_sample_interval_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub pretty: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            pretty: false,
        }
    }
}

impl Config {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads and validates the file at `path`. A missing file yields the
    /// defaults.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            warn!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml(&content, path)?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, self.to_toml()?)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let link = &self.link;
        let checks = [
            (link.host.trim().is_empty(), "link.host must not be empty"),
            (link.port == 0, "link.port must not be 0"),
            (link.transmit_period_ms == 0, "link.transmit_period_ms must be positive"),
            (link.liveness_timeout_ms == 0, "link.liveness_timeout_ms must be positive"),
            (
                link.liveness_check_interval_ms == 0,
                "link.liveness_check_interval_ms must be positive",
            ),
            (link.open_timeout_ms == 0, "link.open_timeout_ms must be positive"),
            (self.latency.window == 0, "latency.window must be positive"),
            (
                self.logging.level.parse::<Level>().is_err(),
                "logging.level must be trace, debug, info, warn or error",
            ),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_string())),
            None => Ok(()),
        }
    }
}

/// `<config dir>/robotlink/config.toml`, or `./robotlink/config.toml` when
/// the platform has no config directory.
pub fn default_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    });
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}

/// Writes a default config to `path` unless a file is already there.
/// Returns whether a file was written.
pub async fn ensure_default_config(path: &Path) -> Result<bool, ConfigError> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if exists {
        debug!("Config file {} already present", path.display());
        return Ok(false);
    }

    Config::default().save(path).await?;
    info!("Wrote default config to {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn defaults_match_the_robot_firmware() {
        let config = Config::default();
        assert_eq!(config.link.host, "10.0.0.22");
        assert_eq!(config.link.port, 22211);
        assert_eq!(config.link.transmit_period(), Duration::from_millis(100));
        assert_eq!(config.link.liveness_timeout(), Duration::from_millis(2000));
        assert_eq!(config.link.liveness_check_interval(), Duration::from_millis(1000));
        assert_eq!(config.latency.window, 50);
        assert_eq!(config.protocol.checksum, ChecksumAlgorithm::Crc16Arc);
        assert_eq!(config.protocol.rx_checksum, RxChecksumPolicy::Ignore);
        assert_eq!(config.protocol.packing, PackingMode::Concatenate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_files_fill_in_defaults() -> TestResult {
        let content = r#"
            [link]
            host = "192.168.1.50"

            [protocol]
            checksum = "crc16-xmodem"
            rx_checksum = "verify"
        "#;
        let config = Config::from_toml(content, Path::new("test.toml"))?;

        assert_eq!(config.link.host, "192.168.1.50");
        assert_eq!(config.link.port, 22211);
        assert_eq!(config.protocol.checksum, ChecksumAlgorithm::Crc16Xmodem);
        assert_eq!(config.protocol.rx_checksum, RxChecksumPolicy::Verify);
        assert_eq!(config.latency, LatencyConfig::default());
        Ok(())
    }

    #[test]
    fn unknown_algorithm_is_a_parse_error() {
        let result = Config::from_toml("[protocol]\nchecksum = \"md5\"", Path::new("bad.toml"));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn zero_periods_are_rejected() {
        let mut config = Config::default();
        config.link.transmit_period_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.latency.window = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn log_levels_are_checked() {
        let mut config = Config::default();
        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());

        config.logging.level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() -> TestResult {
        let dir = tempfile::tempdir()?;
        let config = Config::load(&dir.path().join("absent.toml")).await?;
        assert_eq!(config, Config::default());
        Ok(())
    }

    #[tokio::test]
    async fn default_config_is_written_once() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CONFIG_DIR).join(CONFIG_FILE);

        assert!(ensure_default_config(&path).await?);
        assert!(!ensure_default_config(&path).await?);

        let loaded = Config::load(&path).await?;
        assert_eq!(loaded, Config::default());
        Ok(())
    }

    #[tokio::test]
    async fn saved_changes_survive_a_reload() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.link.port = 5000;
        config.protocol.packing = PackingMode::FirstSlotOnly;
        config.save(&path).await?;

        assert_eq!(Config::load(&path).await?, config);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_files_fail_to_load() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[link]\nport = 0\n").await?;
        assert!(matches!(Config::load(&path).await, Err(ConfigError::Invalid(_))));

        tokio::fs::write(&path, "[logging]\nlevel = \"loud\"\n").await?;
        assert!(matches!(Config::load(&path).await, Err(ConfigError::Invalid(_))));
        Ok(())
    }
}
