//! Peer mailboxes
//!
//! Each peer that has been addressed by an offer, answer or ICE candidate
//! gets a mailbox holding the latest offer and answer plus the candidates
//! queued since the last poll. Mailboxes are created lazily on first write
//! and evicted by the sweeper once idle for longer than the TTL.
//!
//! Draining a mailbox clears the answer and candidates but keeps the offer,
//! so a polling peer can fetch the offer again while the handshake retries.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use tracing::info;

use crate::messages::Payload;

/// Pending signaling state for one peer
#[derive(Clone, Debug)]
pub struct PeerRecord {
    /// Last offer addressed to this peer
    pub offer: Option<Payload>,
    /// Last answer addressed to this peer
    pub answer: Option<Payload>,
    /// ICE candidates queued since the last drain
    pub candidates: Vec<Payload>,
    /// Refreshed on every write
    pub last_updated: Instant,
}

impl PeerRecord {
    fn new() -> Self {
        Self {
            offer: None,
            answer: None,
            candidates: Vec::new(),
            last_updated: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_updated = Instant::now();
    }

    /// Check if the record has been idle for longer than `ttl` as of `now`
    pub fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_updated) > ttl
    }
}

/// Snapshot returned by [`Mailbox::drain`]
#[derive(Clone, Debug, PartialEq)]
pub struct Drained {
    pub offer: Option<Payload>,
    pub answer: Option<Payload>,
    pub candidates: Vec<Payload>,
    /// Wall-clock time of the drain
    pub timestamp: DateTime<Utc>,
}

/// Peer mailboxes keyed by peer id
///
/// Operations on one peer are serialized by the map's shard locks, so the
/// mailbox is safe to share across a multi-threaded runtime.
#[derive(Debug, Default)]
pub struct Mailbox {
    peers: DashMap<String, PeerRecord>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record for `peer_id`, creating an empty one if needed
    ///
    /// The returned guard holds the shard lock; keep it short-lived.
    pub fn get_or_create(&self, peer_id: &str) -> RefMut<'_, String, PeerRecord> {
        self.peers
            .entry(peer_id.to_string())
            .or_insert_with(PeerRecord::new)
    }

    /// Overwrite the pending offer
    pub fn set_offer(&self, peer_id: &str, offer: Payload) {
        let mut record = self.get_or_create(peer_id);
        record.offer = Some(offer);
        record.touch();
    }

    /// Overwrite the pending answer
    pub fn set_answer(&self, peer_id: &str, answer: Payload) {
        let mut record = self.get_or_create(peer_id);
        record.answer = Some(answer);
        record.touch();
    }

    /// Queue an ICE candidate
    pub fn append_candidate(&self, peer_id: &str, candidate: Payload) {
        let mut record = self.get_or_create(peer_id);
        record.candidates.push(candidate);
        record.touch();
    }

    /// Read the mailbox and clear the one-shot parts
    ///
    /// Returns `None` if no record exists. The offer is returned as-is and
    /// kept; the answer and candidates are handed out once. Draining does
    /// not refresh `last_updated`.
    pub fn drain(&self, peer_id: &str) -> Option<Drained> {
        let mut record = self.peers.get_mut(peer_id)?;
        Some(Drained {
            offer: record.offer.clone(),
            answer: record.answer.take(),
            candidates: std::mem::take(&mut record.candidates),
            timestamp: Utc::now(),
        })
    }

    /// Copy of the record for `peer_id`, if any
    pub fn get(&self, peer_id: &str) -> Option<PeerRecord> {
        self.peers.get(peer_id).map(|r| r.value().clone())
    }

    /// Check if a record exists for `peer_id`
    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Evict records idle for longer than `ttl`, returning how many were removed
    pub fn sweep(&self, ttl: Duration) -> usize {
        self.sweep_at(Instant::now(), ttl)
    }

    /// Evict records idle for longer than `ttl` as of `now`
    pub fn sweep_at(&self, now: Instant, ttl: Duration) -> usize {
        let expired: Vec<String> = self
            .peers
            .iter()
            .filter(|r| r.is_idle(now, ttl))
            .map(|r| r.key().clone())
            .collect();

        let mut evicted = 0;
        for peer_id in expired {
            // Re-check under the shard lock; a write may have landed since the scan
            if self
                .peers
                .remove_if(&peer_id, |_, r| r.is_idle(now, ttl))
                .is_some()
            {
                info!(peer = %peer_id, "Cleaned up expired peer");
                evicted += 1;
            }
        }
        evicted
    }
}
