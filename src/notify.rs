//! Change-notification fanout.
//!
//! The refresh worker publishes an [`UpdateEvent`] after every manifest
//! replace; every live SSE session holds a subscription and forwards what
//! it receives. Delivery is best-effort and at-most-once: events published
//! while a client is disconnected are lost, not queued, and publish
//! failures never affect the manifest update they accompany.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Broadcast buffer size per subscriber. A slow client that falls this far
/// behind observes a `Lagged` error and loses the skipped events.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connected,
    Heartbeat,
    GameweekUpdated,
    Error,
}

/// One transient notification message, serialized as
/// `{"type": ..., "timestamp": ..., "data": {...}}` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl UpdateEvent {
    fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now().timestamp(),
            data,
        }
    }

    pub fn connected() -> Self {
        Self::new(EventKind::Connected, serde_json::Value::Null)
    }

    pub fn heartbeat() -> Self {
        Self::new(EventKind::Heartbeat, serde_json::Value::Null)
    }

    pub fn error(message: &str) -> Self {
        Self::new(EventKind::Error, serde_json::json!({ "message": message }))
    }

    pub fn gameweek_updated(gameweek: u32, manifest_version: &str, updated_at: &str) -> Self {
        Self::new(
            EventKind::GameweekUpdated,
            serde_json::json!({
                "gameweek": gameweek,
                "manifest_version": manifest_version,
                "updated_at": updated_at,
            }),
        )
    }
}

/// Fanout channel for [`UpdateEvent`]s.
pub struct UpdatePublisher {
    tx: broadcast::Sender<UpdateEvent>,
}

impl Default for UpdatePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdatePublisher {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Fire-and-forget publish. Having no connected subscribers is not a
    /// failure; the event is simply dropped.
    pub fn publish(&self, event: UpdateEvent) {
        let kind = event.kind;
        match self.tx.send(event) {
            Ok(n) => log::info!("[push] published {:?} event to {} subscriber(s)", kind, n),
            Err(_) => log::debug!("[push] no subscribers for {:?} event", kind),
        }
    }

    /// Begin receiving every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
