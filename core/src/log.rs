use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recorded activity completion. Entries are immutable — once appended,
/// never changed. The progress-analytics collaborator aggregates over these;
/// it never reads routine state directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    /// Unique entry ID (UUIDv7 — time-sortable)
    pub id: Uuid,
    pub routine_id: Uuid,
    pub child_id: Uuid,
    pub activity_id: Uuid,
    /// Activity name at completion time, denormalized so analytics never
    /// has to join back into routine state.
    pub activity_name: String,
    /// Completion cycle of the routine when this entry was written.
    pub cycle: u32,
    /// When the activity was completed (domain time).
    pub completed_at: DateTime<Utc>,
    /// When the entry was appended (record time).
    pub recorded_at: DateTime<Utc>,
    /// How the completion arrived.
    pub source: LogSource,
}

/// How a completion was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    /// Resolved from a chat message.
    Chat,
    /// Entered directly by a caregiver.
    Manual,
}

impl ActivityLogEntry {
    pub fn new(
        routine_id: Uuid,
        child_id: Uuid,
        activity_id: Uuid,
        activity_name: impl Into<String>,
        cycle: u32,
        completed_at: DateTime<Utc>,
        source: LogSource,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            routine_id,
            child_id,
            activity_id,
            activity_name: activity_name.into(),
            cycle,
            completed_at,
            recorded_at: Utc::now(),
            source,
        }
    }

    /// Key the store uses to refuse duplicate appends. One activity can be
    /// logged once per routine cycle; retried messages hit the same key.
    pub fn dedupe_key(&self) -> LogDedupeKey {
        LogDedupeKey {
            routine_id: self.routine_id,
            activity_id: self.activity_id,
            cycle: self.cycle,
        }
    }
}

/// Identity of a completion for idempotent appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogDedupeKey {
    pub routine_id: Uuid,
    pub activity_id: Uuid,
    pub cycle: u32,
}
