//! Configuration for the download manager and its transport.
//!
//! Settings can be built in code with the `with_*` builders or loaded from
//! an INI file:
//!
//! ```ini
//! [download]
//! ; 0 means unlimited
//! max_active = 4
//!
//! [http]
//! timeout = 30
//! connect_timeout = 10
//! user_agent = my-app/1.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

/// Default whole-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or parse the file.
    #[error("Failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// A key holds a value that cannot be used.
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// HTTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Whole-request timeout, including reading the body.
    pub timeout: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            user_agent: format!("fetchstack/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Download manager settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Maximum downloads talking to the transport at once.
    ///
    /// `None` admits every download immediately. Downloads over the limit
    /// wait for a slot and stay cancellable meanwhile.
    pub max_active_downloads: Option<usize>,

    /// Transport settings, used when the manager builds its own transport.
    pub transport: TransportConfig,
}

impl ManagerConfig {
    /// Limit concurrently active downloads. Zero is treated as one.
    pub fn with_max_active_downloads(mut self, max: usize) -> Self {
        self.max_active_downloads = Some(max.max(1));
        self
    }

    pub fn with_unlimited_downloads(mut self) -> Self {
        self.max_active_downloads = None;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Load configuration from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }
}

/// Default config file location (`<config dir>/fetchstack/config.ini`).
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("fetchstack").join("config.ini"))
        .unwrap_or_else(|| PathBuf::from("fetchstack.ini"))
}

/// Overlay values found in `ini` onto the defaults.
fn parse_ini(ini: &Ini) -> Result<ManagerConfig, ConfigError> {
    let mut config = ManagerConfig::default();

    // [download] section
    if let Some(section) = ini.section(Some("download")) {
        if let Some(v) = section.get("max_active") {
            let max: usize = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                section: "download".to_string(),
                key: "max_active".to_string(),
                value: v.to_string(),
                reason: "must be a non-negative integer (0 = unlimited)".to_string(),
            })?;
            config.max_active_downloads = if max == 0 { None } else { Some(max) };
        }
    }

    // [http] section
    if let Some(section) = ini.section(Some("http")) {
        if let Some(v) = section.get("timeout") {
            config.transport.timeout = parse_secs("timeout", v)?;
        }
        if let Some(v) = section.get("connect_timeout") {
            config.transport.connect_timeout = parse_secs("connect_timeout", v)?;
        }
        if let Some(v) = section.get("user_agent") {
            let v = v.trim();
            if !v.is_empty() {
                config.transport.user_agent = v.to_string();
            }
        }
    }

    Ok(config)
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue {
            section: "http".to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be a positive integer (seconds)".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.ini");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert!(config.max_active_downloads.is_none());
        assert_eq!(config.transport.timeout, Duration::from_secs(30));
        assert_eq!(config.transport.connect_timeout, Duration::from_secs(10));
        assert!(config.transport.user_agent.starts_with("fetchstack/"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = ManagerConfig::default()
            .with_max_active_downloads(0)
            .with_transport(
                TransportConfig::default()
                    .with_timeout(Duration::from_secs(5))
                    .with_user_agent("tester"),
            );

        assert_eq!(config.max_active_downloads, Some(1));
        assert_eq!(config.transport.timeout, Duration::from_secs(5));
        assert_eq!(config.transport.user_agent, "tester");

        let config = config.with_unlimited_downloads();
        assert!(config.max_active_downloads.is_none());
    }

    #[test]
    fn test_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ManagerConfig::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ManagerConfig::default());
    }

    #[test]
    fn test_load_full_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[download]\nmax_active = 6\n\n[http]\ntimeout = 90\nconnect_timeout = 3\nuser_agent = agent/2\n",
        );

        let config = ManagerConfig::load_from(&path).unwrap();
        assert_eq!(config.max_active_downloads, Some(6));
        assert_eq!(config.transport.timeout, Duration::from_secs(90));
        assert_eq!(config.transport.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.transport.user_agent, "agent/2");
    }

    #[test]
    fn test_zero_max_active_means_unlimited() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[download]\nmax_active = 0\n");

        let config = ManagerConfig::load_from(&path).unwrap();
        assert!(config.max_active_downloads.is_none());
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[http]\ntimeout = soon\n");

        match ManagerConfig::load_from(&path) {
            Err(ConfigError::InvalidValue { section, key, .. }) => {
                assert_eq!(section, "http");
                assert_eq!(key, "timeout");
            }
            other => panic!("expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_max_active_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[download]\nmax_active = -2\n");

        assert!(matches!(
            ManagerConfig::load_from(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
