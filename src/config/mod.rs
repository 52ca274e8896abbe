//! Configuration module
//!
//! Handles loading and saving mobilelink configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::link::{LinkConfig, WaitPolicy, DEFAULT_PORT};
use crate::protocol::{Side, END_OF_COMMAND};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Link cable settings
    #[serde(default)]
    pub link: LinkSettings,

    /// Active session settings
    #[serde(default)]
    pub session: SessionSettings,

    /// Trace analysis settings
    #[serde(default)]
    pub trace: TraceSettings,
}

/// Link cable configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Interface to bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port the emulator connects to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bound on the version handshake in ms (unbounded if not set)
    pub handshake_timeout_ms: Option<u64>,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            handshake_timeout_ms: None,
        }
    }
}

/// Active session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Device byte sent after each frame
    #[serde(default = "default_local_device")]
    pub local_device: u8,
    /// Pause between unanswered polls (ms)
    #[serde(default = "default_poll_backoff")]
    pub poll_backoff_ms: u64,
    /// Bound on waiting for a reply in ms (unbounded if not set)
    pub exchange_timeout_ms: Option<u64>,
}

fn default_local_device() -> u8 {
    END_OF_COMMAND
}

fn default_poll_backoff() -> u64 {
    10
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            local_device: default_local_device(),
            poll_backoff_ms: default_poll_backoff(),
            exchange_timeout_ms: None,
        }
    }
}

/// Side of the capture assumed to send when both channels carry a marker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initiator {
    #[default]
    Console,
    Adapter,
}

impl From<Initiator> for Side {
    fn from(initiator: Initiator) -> Side {
        match initiator {
            Initiator::Console => Side::Console,
            Initiator::Adapter => Side::Adapter,
        }
    }
}

/// Trace analysis configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceSettings {
    #[serde(default)]
    pub initiator: Initiator,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("mobilelink/config.toml")),
            Some(PathBuf::from("./mobilelink.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                tracing::debug!("Using configuration from {}", path.display());
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Listener settings, with the session's exchange bound applied
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            bind_address: self.link.bind_address.clone(),
            port: self.link.port,
            handshake_timeout_ms: self.link.handshake_timeout_ms,
            exchange_timeout_ms: self.session.exchange_timeout_ms,
        }
    }

    /// How the driver waits for replies
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: self.session.exchange_timeout_ms.map(Duration::from_millis),
            backoff: Duration::from_millis(self.session.poll_backoff_ms),
        }
    }

    pub fn initiator(&self) -> Side {
        self.trace.initiator.into()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        link: LinkSettings {
            handshake_timeout_ms: Some(30_000),
            ..Default::default()
        },
        session: SessionSettings {
            exchange_timeout_ms: Some(5_000),
            ..Default::default()
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.link.port, DEFAULT_PORT);
        assert_eq!(config.session.local_device, 0x80);
        assert_eq!(config.wait_policy(), WaitPolicy::default());
        assert_eq!(config.initiator(), Side::Console);
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.trace.initiator = Initiator::Adapter;
        config.session.exchange_timeout_ms = Some(250);
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.initiator(), Side::Adapter);
        assert_eq!(
            loaded.wait_policy().timeout,
            Some(Duration::from_millis(250))
        );
        assert_eq!(loaded.link_config().exchange_timeout_ms, Some(250));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[link]\nport = 9000\n").unwrap();
        assert_eq!(config.link.port, 9000);
        assert_eq!(config.link.bind_address, "127.0.0.1");
        assert_eq!(config.session, SessionSettings::default());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/mobilelink.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config().unwrap();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.link.handshake_timeout_ms, Some(30_000));
        assert!(sample.contains("initiator = \"console\""));
    }
}
