//! Domain events emitted by asset mutations.
//!
//! The repository publishes through an [`EventSender`]; a single consumer
//! drains the paired receiver. `publish` waits for queue capacity, so a slow
//! consumer holds up the mutating call.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::asset::Asset;
use crate::types::Timestamp;

/// Default number of events buffered before publishers wait.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// AssetEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation that happened to an asset or an asset type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEvent {
    /// Time-ordered event id.
    pub id: Uuid,

    /// Dot-separated name, e.g. `"updated.server.srv1"` or `"created.server"`.
    pub event_type: String,

    pub kind: EventKind,

    /// JSON of the asset (or a type-only stub for type events).
    pub payload: serde_json::Value,

    pub timestamp: Timestamp,
}

impl AssetEvent {
    /// Build an event named `{kind}.{subject}`.
    pub fn new(kind: EventKind, subject: &str, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: format!("{kind}.{subject}"),
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Event about a single asset, named `{kind}.{type}.{id}`.
    pub fn for_asset(kind: EventKind, asset: &Asset) -> Self {
        let payload = serde_json::to_value(asset).unwrap_or(serde_json::Value::Null);
        Self::new(kind, &asset.subject(), payload)
    }

    /// Event about an asset type, named `{kind}.{type}`.
    pub fn for_type(kind: EventKind, asset_type: &str) -> Self {
        Self::new(
            kind,
            asset_type,
            serde_json::json!({ "type": asset_type }),
        )
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Publishing half of the event queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<AssetEvent>,
}

/// Create the event queue with room for `capacity` pending events.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<AssetEvent>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (EventSender { sender }, receiver)
}

impl EventSender {
    /// Queue an event, waiting while the queue is full.
    ///
    /// A closed queue (consumer gone) drops the event with a warning; event
    /// delivery never fails the mutation that produced it.
    pub async fn publish(&self, event: AssetEvent) {
        if let Err(mpsc::error::SendError(event)) = self.sender.send(event).await {
            tracing::warn!(
                event_type = %event.event_type,
                "Event queue closed, dropping event"
            );
        }
    }
}
