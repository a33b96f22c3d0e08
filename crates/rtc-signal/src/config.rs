//! Configuration for the signal relay
//!
//! Supports a TOML configuration file with sensible defaults.
//! The file is looked up at:
//! - macOS: ~/Library/Application Support/rtc-signal/signal.toml
//! - Linux: ~/.config/rtc-signal/signal.toml
//! - Windows: %APPDATA%/rtc-signal/signal.toml
//!
//! Command line flags override whatever the file sets.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::{DEFAULT_PORT, PEER_TTL_SECS, SWEEP_INTERVAL_SECS};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Listener settings
    pub server: ServerConfig,
    /// Mailbox expiry settings
    pub mailbox: MailboxConfig,
    /// Cross-origin settings
    pub cors: CorsConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: IpAddr,
    /// HTTP port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

/// Mailbox expiry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Idle time in seconds before a peer mailbox is evicted
    pub peer_ttl_secs: u64,
    /// Seconds between sweeps
    pub sweep_interval_secs: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            peer_ttl_secs: PEER_TTL_SECS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
        }
    }
}

impl MailboxConfig {
    pub fn peer_ttl(&self) -> Duration {
        Duration::from_secs(self.peer_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        // A zero interval would make tokio::time::interval panic
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; "*" allows any origin
    pub allow_origins: Vec<String>,
    /// Allow credentialed requests
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_credentials: true,
        }
    }
}

impl CorsConfig {
    /// Whether any origin is accepted
    pub fn allows_any_origin(&self) -> bool {
        self.allow_origins.iter().any(|o| o == "*")
    }
}

impl SignalConfig {
    /// Load configuration from a specific path
    ///
    /// A missing file is not an error; defaults are returned instead.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: SignalConfig = toml::from_str(&content)?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load from an explicit path, or from the default path if none is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) => Self::load_from(&path),
                None => {
                    debug!("No config directory found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "rtc-signal", "rtc-signal")
            .map(|dirs| dirs.config_dir().join("signal.toml"))
    }

    /// Socket address the server listens on
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind, self.server.port)
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}
