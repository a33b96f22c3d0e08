//! Signal protocol messages
//!
//! Offer, answer and candidate payloads are opaque to the relay. They must
//! be JSON objects; anything else is rejected when the body is decoded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mailbox::Drained;

/// Opaque signaling payload (a JSON object)
pub type Payload = Map<String, Value>;

/// Body of `POST /offer` and `POST /answer`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignalRequest {
    pub from_peer: String,
    pub to_peer: String,
    pub signal: Payload,
}

/// Body of `POST /ice-candidate`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    pub from_peer: String,
    pub to_peer: String,
    pub candidate: Payload,
}

/// Plain `{status}` acknowledgement
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

/// Health endpoint payload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub peers: usize,
    pub connections: usize,
}

/// Result of polling a mailbox
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckResponse {
    /// Nothing has ever been addressed to this peer (or it expired)
    NoPeer,

    /// Snapshot of the mailbox at drain time
    Check {
        offer: Option<Payload>,
        answer: Option<Payload>,
        has_candidates: bool,
        candidates: Vec<Payload>,
        timestamp: String,
    },
}

impl CheckResponse {
    /// Build the poll response for a drain result
    pub fn from_drained(drained: Option<Drained>) -> Self {
        match drained {
            None => Self::NoPeer,
            Some(d) => Self::Check {
                offer: d.offer,
                answer: d.answer,
                has_candidates: !d.candidates.is_empty(),
                candidates: d.candidates,
                timestamp: format_timestamp(d.timestamp),
            },
        }
    }
}

/// Messages pushed to a connected client
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// An offer addressed to the client
    Offer { from: String, signal: Payload },

    /// Keepalive reply
    Pong,
}

impl PushMessage {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Classification of an inbound push-channel text frame
#[derive(Clone, Debug, PartialEq)]
pub enum ClientFrame {
    /// `{"type": "ping"}`
    Ping,
    /// Any other well-formed JSON
    Other(Value),
}

impl ClientFrame {
    /// Parse a text frame; non-JSON input is an error
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        if value.get("type").and_then(Value::as_str) == Some("ping") {
            Ok(Self::Ping)
        } else {
            Ok(Self::Other(value))
        }
    }
}

/// Naive UTC timestamp with microseconds, e.g. `2024-05-01T12:30:00.123456`
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
