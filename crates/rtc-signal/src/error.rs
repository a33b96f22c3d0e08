//! Error types for the signal relay

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Push channel failures
///
/// These are expected in normal operation (tab closed, network drop) and
/// only ever degrade to "not delivered".
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("send failed: {0}")]
    Send(String),
}

/// Server startup / runtime errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
