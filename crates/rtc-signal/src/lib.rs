//! RTC Signal Relay
//!
//! Lightweight signaling relay for WebRTC peers. Peers exchange offers,
//! answers and ICE candidates through the relay, either pushed over a
//! WebSocket or collected by polling.
//!
//! # Protocol
//!
//! 1. Peer A posts an offer addressed to peer B
//! 2. The relay stores it in B's mailbox and pushes it if B is connected
//! 3. B answers and both sides trickle ICE candidates the same way
//! 4. Peers without a WebSocket poll `/check/{peer_id}` to drain their mailbox
//! 5. Peers establish a direct connection; the relay drops idle mailboxes

pub mod config;
pub mod error;
pub mod mailbox;
pub mod messages;
pub mod registry;
pub mod server;
pub mod sweeper;

pub use config::SignalConfig;
pub use error::{ChannelError, ConfigError, ServerError};
pub use mailbox::{Drained, Mailbox, PeerRecord};
pub use messages::{CheckResponse, Payload, PushMessage};
pub use registry::{PushChannel, Registration, Registry};
pub use server::{AppState, SignalServer};
pub use sweeper::{Sweeper, SweeperHandle};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8000;

/// Idle time after which a peer mailbox is evicted (30 minutes)
pub const PEER_TTL_SECS: u64 = 30 * 60;

/// Interval between mailbox sweeps
pub const SWEEP_INTERVAL_SECS: u64 = 60;
