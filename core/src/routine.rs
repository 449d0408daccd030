use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a routine.
///
/// The persistence layer stores this as a small integer (legacy numeric
/// columns); `as_code`/`from_code` are the only place that mapping lives.
/// Everywhere else the status is this closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineStatus {
    Inactive,
    Active,
    Completed,
    Paused,
}

impl RoutineStatus {
    pub fn as_code(self) -> i16 {
        match self {
            RoutineStatus::Inactive => 0,
            RoutineStatus::Active => 1,
            RoutineStatus::Completed => 2,
            RoutineStatus::Paused => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(RoutineStatus::Inactive),
            1 => Some(RoutineStatus::Active),
            2 => Some(RoutineStatus::Completed),
            3 => Some(RoutineStatus::Paused),
            _ => None,
        }
    }
}

/// Completion state of a single activity within a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    NotStarted,
    InProgress,
    Completed,
    Skipped,
}

impl ActivityStatus {
    pub fn as_code(self) -> i16 {
        match self {
            ActivityStatus::NotStarted => 0,
            ActivityStatus::InProgress => 1,
            ActivityStatus::Completed => 2,
            ActivityStatus::Skipped => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(ActivityStatus::NotStarted),
            1 => Some(ActivityStatus::InProgress),
            2 => Some(ActivityStatus::Completed),
            3 => Some(ActivityStatus::Skipped),
            _ => None,
        }
    }

    /// An activity still waiting to be done (not yet completed or skipped).
    pub fn is_open(self) -> bool {
        matches!(self, ActivityStatus::NotStarted | ActivityStatus::InProgress)
    }
}

/// One step within a routine. Sequence position is fixed at creation;
/// completion state changes, position never does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ActivityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// 0-based position in the routine's sequence.
    pub position: usize,
}

impl Activity {
    pub fn new(position: usize, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            status: ActivityStatus::NotStarted,
            completed_at: None,
            position,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An ordered, named set of activities assigned to one child.
///
/// Invariants maintained by the engine:
/// - activity order is fixed at creation
/// - while ACTIVE, `current_activity_index` points at the first open activity
/// - COMPLETED iff no activity is left open
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub id: Uuid,
    pub child_id: Uuid,
    pub name: String,
    pub activities: Vec<Activity>,
    pub status: RoutineStatus,
    pub current_activity_index: usize,
    /// Completion cycle. Incremented on each restart after completion;
    /// part of the activity-log dedupe key so a new cycle logs fresh entries.
    pub cycle: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Routine {
    pub fn new(child_id: Uuid, name: impl Into<String>, activities: Vec<Activity>) -> Self {
        Self {
            id: Uuid::now_v7(),
            child_id,
            name: name.into(),
            activities,
            status: RoutineStatus::Inactive,
            current_activity_index: 0,
            cycle: 0,
            started_at: None,
            completed_at: None,
        }
    }

    /// Convenience constructor from step names, in order.
    pub fn from_step_names(child_id: Uuid, name: impl Into<String>, steps: &[&str]) -> Self {
        let activities = steps
            .iter()
            .enumerate()
            .map(|(position, step)| Activity::new(position, *step))
            .collect();
        Self::new(child_id, name, activities)
    }

    /// The activity the stored pointer designates, if it is still open.
    /// Position is carried in the routine, never recomputed from text.
    pub fn current_activity(&self) -> Option<&Activity> {
        self.activities
            .get(self.current_activity_index)
            .filter(|activity| activity.status.is_open())
    }

    /// Position of the first open activity in sequence order.
    pub fn first_open_position(&self) -> Option<usize> {
        self.activities
            .iter()
            .position(|activity| activity.status.is_open())
    }

    pub fn completed_count(&self) -> usize {
        self.activities
            .iter()
            .filter(|a| a.status == ActivityStatus::Completed)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.activities
            .iter()
            .filter(|a| a.status == ActivityStatus::Skipped)
            .count()
    }

    pub fn open_count(&self) -> usize {
        self.activities
            .iter()
            .filter(|a| a.status.is_open())
            .count()
    }

    /// Progress as completed/total × 100, rounded to one decimal.
    /// Skipped activities stay in the denominator but never the numerator.
    pub fn progress_percent(&self) -> f64 {
        if self.activities.is_empty() {
            return 0.0;
        }
        let raw = self.completed_count() as f64 / self.activities.len() as f64 * 100.0;
        round_percent(raw)
    }

    /// No activity left open. This is the COMPLETED condition; a routine
    /// whose tail was skipped still terminates.
    pub fn all_steps_closed(&self) -> bool {
        self.open_count() == 0
    }

    /// The view of this routine handed to the message pipeline.
    pub fn snapshot(&self) -> RoutineSnapshot {
        RoutineSnapshot {
            routine_id: self.id,
            name: self.name.clone(),
            activities: self
                .activities
                .iter()
                .map(|activity| ActivityBrief {
                    name: activity.name.clone(),
                    status: activity.status,
                    position: activity.position,
                })
                .collect(),
            current_activity_index: self.current_activity_index,
        }
    }
}

/// Round a percentage to one decimal place.
pub fn round_percent(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Caller-supplied view of the active routine used for message analysis.
/// The engine never fetches this itself — whoever handles the conversation
/// turn passes it in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineSnapshot {
    pub routine_id: Uuid,
    pub name: String,
    /// Ordered. Positions match the routine's fixed sequence.
    pub activities: Vec<ActivityBrief>,
    pub current_activity_index: usize,
}

impl RoutineSnapshot {
    /// The activity the pointer designates, if it is still open.
    pub fn current_activity(&self) -> Option<&ActivityBrief> {
        self.activities
            .get(self.current_activity_index)
            .filter(|activity| activity.status.is_open())
    }
}

/// Name + state of one activity inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityBrief {
    pub name: String,
    pub status: ActivityStatus,
    pub position: usize,
}
