//! Persistence boundary. The engine mutates routines in memory, then hands
//! the whole routine to [`RoutineStore::persist_routine`] so status, pointer
//! and activity rows land in one write — a reader never observes progress
//! updated while the pointer is stale.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use sprout_core::log::{ActivityLogEntry, LogDedupeKey};
use sprout_core::routine::{Routine, RoutineStatus};

/// Outbound persistence collaborator. Backends return owned routines; the
/// engine never holds references into the store across a mutation.
pub trait RoutineStore {
    fn routine(&self, routine_id: Uuid) -> Result<Option<Routine>, StoreError>;
    /// All routines assigned to a child, in insertion order.
    fn routines_for_child(&self, child_id: Uuid) -> Result<Vec<Routine>, StoreError>;
    /// The child's ACTIVE routine, if any. At most one exists by invariant.
    fn active_routine(&self, child_id: Uuid) -> Result<Option<Routine>, StoreError>;
    /// Atomic write of routine status, pointer, and all activity rows.
    fn persist_routine(&mut self, routine: &Routine) -> Result<(), StoreError>;
    /// Append-only. A duplicate dedupe key is reported, not an error —
    /// retried completions are normal traffic.
    fn append_log(&mut self, entry: ActivityLogEntry) -> Result<LogAppend, StoreError>;
    fn log_entries(&self, routine_id: Uuid) -> Result<Vec<ActivityLogEntry>, StoreError>;
}

/// Whether an append actually wrote a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogAppend {
    Appended,
    Duplicate,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(String),
}

/// In-memory store used by tests and the local composition root.
///
/// Routines are partitioned per child; nothing is shared between children,
/// so operations for one child can never contend with another's.
#[derive(Debug, Default)]
pub struct MemoryStore {
    routines: HashMap<Uuid, Routine>,
    by_child: HashMap<Uuid, Vec<Uuid>>,
    log: Vec<ActivityLogEntry>,
    log_keys: HashSet<LogDedupeKey>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a routine. Seeding only — runtime mutations go through
    /// `persist_routine`.
    pub fn insert_routine(&mut self, routine: Routine) {
        self.by_child
            .entry(routine.child_id)
            .or_default()
            .push(routine.id);
        self.routines.insert(routine.id, routine);
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }
}

impl RoutineStore for MemoryStore {
    fn routine(&self, routine_id: Uuid) -> Result<Option<Routine>, StoreError> {
        Ok(self.routines.get(&routine_id).cloned())
    }

    fn routines_for_child(&self, child_id: Uuid) -> Result<Vec<Routine>, StoreError> {
        let ids = self.by_child.get(&child_id);
        Ok(ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.routines.get(id))
            .cloned()
            .collect())
    }

    fn active_routine(&self, child_id: Uuid) -> Result<Option<Routine>, StoreError> {
        Ok(self
            .routines_for_child(child_id)?
            .into_iter()
            .find(|routine| routine.status == RoutineStatus::Active))
    }

    fn persist_routine(&mut self, routine: &Routine) -> Result<(), StoreError> {
        if !self.routines.contains_key(&routine.id) {
            self.by_child
                .entry(routine.child_id)
                .or_default()
                .push(routine.id);
        }
        self.routines.insert(routine.id, routine.clone());
        Ok(())
    }

    fn append_log(&mut self, entry: ActivityLogEntry) -> Result<LogAppend, StoreError> {
        if !self.log_keys.insert(entry.dedupe_key()) {
            return Ok(LogAppend::Duplicate);
        }
        self.log.push(entry);
        Ok(LogAppend::Appended)
    }

    fn log_entries(&self, routine_id: Uuid) -> Result<Vec<ActivityLogEntry>, StoreError> {
        Ok(self
            .log
            .iter()
            .filter(|entry| entry.routine_id == routine_id)
            .cloned()
            .collect())
    }
}
