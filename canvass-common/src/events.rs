//! Event types for the Canvass sync event system
//!
//! The sync engine publishes progress over a broadcast `EventBus` rather than
//! calling back into the UI layer directly; presentation code subscribes and
//! renders whatever granularity it wants.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Stage of a single record's journey through one sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    UploadingData,
    UploadingAudio,
    Verifying,
    Synced,
    Failed,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStage::UploadingData => "uploading_data",
            SyncStage::UploadingAudio => "uploading_audio",
            SyncStage::Verifying => "verifying",
            SyncStage::Synced => "synced",
            SyncStage::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Canvass sync event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A sync run started processing the pending queue
    SyncRunStarted {
        total: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Fine-grained progress within one record
    RecordProgress {
        current_index: usize,
        total: usize,
        record_id: Uuid,
        percent: u8,
        stage: SyncStage,
        synced_count: usize,
        failed_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A record reached the synced state (including idempotent duplicates)
    RecordSynced {
        record_id: Uuid,
        duplicate: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A record failed this attempt
    RecordFailed {
        record_id: Uuid,
        failure_class: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A sync run finished its pass over the queue
    SyncRunCompleted {
        synced_count: usize,
        failed_count: usize,
        success: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SyncEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::SyncRunStarted { .. } => "SyncRunStarted",
            SyncEvent::RecordProgress { .. } => "RecordProgress",
            SyncEvent::RecordSynced { .. } => "RecordSynced",
            SyncEvent::RecordFailed { .. } => "RecordFailed",
            SyncEvent::SyncRunCompleted { .. } => "SyncRunCompleted",
        }
    }
}

/// Broadcast event bus for sync progress
///
/// Wraps `tokio::sync::broadcast`, providing:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SyncEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// Progress updates are non-critical; it is fine if no UI is attached.
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
