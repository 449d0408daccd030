//! Routine lifecycle: INACTIVE →(start)→ ACTIVE →(all steps closed)→
//! COMPLETED, with ACTIVE ⇄ PAUSED via pause/resume. The only exit from
//! COMPLETED is an explicit restart, which begins a new cycle.
//!
//! Everything here mutates an in-memory [`Routine`] and nothing else; the
//! action handler decides when the result is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sprout_core::routine::{ActivityStatus, Routine, RoutineStatus};

use crate::error::EngineError;

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The routine began (or began again after completion).
    Started { restarted: bool },
    /// The routine was already running; nothing changed. Retried "start my
    /// routine" messages must not reset progress.
    AlreadyActive,
}

/// Result of completing one activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// State advanced; the caller should log the completion.
    Advanced {
        completed_position: usize,
        next_position: Option<usize>,
        routine_completed: bool,
    },
    /// The activity was already complete. Success, no state change, and the
    /// caller must not log a second entry.
    AlreadyCompleted,
}

/// Result of skipping one activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped {
        skipped_position: usize,
        next_position: Option<usize>,
        routine_completed: bool,
    },
    /// Already completed or skipped; nothing to do.
    AlreadyClosed,
}

/// Start (or restart) a routine.
///
/// From COMPLETED this resets every activity for a new cycle. From PAUSED it
/// behaves like resume. Starting an ACTIVE routine is a no-op so duplicate
/// start messages never lose progress.
pub fn start(routine: &mut Routine, now: DateTime<Utc>) -> StartOutcome {
    match routine.status {
        RoutineStatus::Active => StartOutcome::AlreadyActive,
        RoutineStatus::Paused => {
            routine.status = RoutineStatus::Active;
            tracing::debug!(routine = %routine.name, "paused routine resumed via start");
            StartOutcome::Started { restarted: false }
        }
        RoutineStatus::Completed => {
            reset_for_new_cycle(routine);
            begin(routine, now);
            tracing::debug!(routine = %routine.name, cycle = routine.cycle, "routine restarted");
            StartOutcome::Started { restarted: true }
        }
        RoutineStatus::Inactive => {
            begin(routine, now);
            tracing::debug!(routine = %routine.name, "routine started");
            StartOutcome::Started { restarted: false }
        }
    }
}

fn begin(routine: &mut Routine, now: DateTime<Utc>) {
    routine.status = RoutineStatus::Active;
    routine.started_at = Some(now);
    routine.completed_at = None;
    point_at_first_open(routine);
}

/// Complete the activity at `position`.
///
/// Rejected unless the routine is ACTIVE. Idempotent: an already-completed
/// activity reports [`CompleteOutcome::AlreadyCompleted`] and mutates
/// nothing. A skipped activity may still be completed afterwards — skipping
/// is a scheduling decision, not a terminal state.
pub fn complete_at(
    routine: &mut Routine,
    position: usize,
    now: DateTime<Utc>,
) -> Result<CompleteOutcome, EngineError> {
    let Some(status) = routine.activities.get(position).map(|a| a.status) else {
        return Err(EngineError::ActivityNotFound {
            routine: routine.name.clone(),
            text: format!("position {position}"),
        });
    };
    // Idempotence outranks the state check: a repeated report for a
    // completed activity succeeds even after the whole routine finished.
    if status == ActivityStatus::Completed {
        return Ok(CompleteOutcome::AlreadyCompleted);
    }
    ensure_active(routine, "complete an activity")?;

    let activity = &mut routine.activities[position];
    activity.status = ActivityStatus::Completed;
    activity.completed_at = Some(now);
    close_step(routine, now);

    let routine_completed = routine.status == RoutineStatus::Completed;
    tracing::debug!(
        routine = %routine.name,
        position,
        progress = routine.progress_percent(),
        routine_completed,
        "activity completed"
    );
    Ok(CompleteOutcome::Advanced {
        completed_position: position,
        next_position: routine.first_open_position(),
        routine_completed,
    })
}

/// Skip the activity at `position`. Same transition rules as completion,
/// but the step lands on SKIPPED and the caller logs nothing.
pub fn skip_at(
    routine: &mut Routine,
    position: usize,
    now: DateTime<Utc>,
) -> Result<SkipOutcome, EngineError> {
    let Some(status) = routine.activities.get(position).map(|a| a.status) else {
        return Err(EngineError::ActivityNotFound {
            routine: routine.name.clone(),
            text: format!("position {position}"),
        });
    };
    if !status.is_open() {
        return Ok(SkipOutcome::AlreadyClosed);
    }
    ensure_active(routine, "skip an activity")?;

    routine.activities[position].status = ActivityStatus::Skipped;
    close_step(routine, now);

    let routine_completed = routine.status == RoutineStatus::Completed;
    tracing::debug!(routine = %routine.name, position, "activity skipped");
    Ok(SkipOutcome::Skipped {
        skipped_position: position,
        next_position: routine.first_open_position(),
        routine_completed,
    })
}

/// ACTIVE → PAUSED. Completed activities and the pointer are untouched.
pub fn pause(routine: &mut Routine) -> Result<(), EngineError> {
    if routine.status != RoutineStatus::Active {
        return Err(EngineError::InvalidState {
            routine: routine.name.clone(),
            status: routine.status,
            action: "pause",
        });
    }
    routine.status = RoutineStatus::Paused;
    tracing::debug!(routine = %routine.name, "routine paused");
    Ok(())
}

/// PAUSED → ACTIVE. The current activity comes from the stored index —
/// never recomputed — so position is never lost across a pause.
pub fn resume(routine: &mut Routine) -> Result<(), EngineError> {
    if routine.status != RoutineStatus::Paused {
        return Err(EngineError::InvalidState {
            routine: routine.name.clone(),
            status: routine.status,
            action: "resume",
        });
    }
    routine.status = RoutineStatus::Active;
    tracing::debug!(
        routine = %routine.name,
        index = routine.current_activity_index,
        "routine resumed"
    );
    Ok(())
}

/// Take a routine out of ACTIVE without completing it. Used to keep one
/// active routine per child; activity states stay as they are.
pub fn deactivate(routine: &mut Routine) {
    routine.status = RoutineStatus::Inactive;
    tracing::debug!(routine = %routine.name, "routine deactivated");
}

/// Point-in-time progress summary. A pure read over the routine struct, so
/// it is always consistent with the mutation that preceded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineProgress {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub remaining: usize,
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_activity: Option<String>,
    pub status: RoutineStatus,
}

pub fn progress(routine: &Routine) -> RoutineProgress {
    RoutineProgress {
        total: routine.activities.len(),
        completed: routine.completed_count(),
        skipped: routine.skipped_count(),
        remaining: routine.open_count(),
        percent: routine.progress_percent(),
        current_activity: routine
            .current_activity()
            .map(|activity| activity.name.clone()),
        status: routine.status,
    }
}

fn ensure_active(routine: &Routine, action: &'static str) -> Result<(), EngineError> {
    if routine.status != RoutineStatus::Active {
        tracing::warn!(routine = %routine.name, status = ?routine.status, action, "rejected transition");
        return Err(EngineError::InvalidState {
            routine: routine.name.clone(),
            status: routine.status,
            action,
        });
    }
    Ok(())
}

/// After a step closes: re-derive the pointer, and finish the routine when
/// nothing is left open.
fn close_step(routine: &mut Routine, now: DateTime<Utc>) {
    point_at_first_open(routine);
    if routine.all_steps_closed() {
        routine.status = RoutineStatus::Completed;
        routine.completed_at = Some(now);
    }
}

/// Move the pointer to the first open activity and mark it in progress.
/// With nothing open, the pointer parks one past the end.
fn point_at_first_open(routine: &mut Routine) {
    match routine.first_open_position() {
        Some(position) => {
            routine.current_activity_index = position;
            if routine.activities[position].status == ActivityStatus::NotStarted {
                routine.activities[position].status = ActivityStatus::InProgress;
            }
        }
        None => routine.current_activity_index = routine.activities.len(),
    }
}

fn reset_for_new_cycle(routine: &mut Routine) {
    routine.cycle += 1;
    for activity in &mut routine.activities {
        activity.status = ActivityStatus::NotStarted;
        activity.completed_at = None;
    }
    routine.completed_at = None;
    routine.current_activity_index = 0;
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use sprout_core::routine::{ActivityStatus, Routine, RoutineStatus};

    use super::{CompleteOutcome, SkipOutcome, StartOutcome, complete_at, pause, progress, resume, skip_at, start};

    fn routine() -> Routine {
        Routine::from_step_names(
            Uuid::now_v7(),
            "Morning Routine",
            &["Wake Up", "Get Dressed", "Eat Breakfast"],
        )
    }

    fn started() -> Routine {
        let mut routine = routine();
        start(&mut routine, Utc::now());
        routine
    }

    #[test]
    fn start_activates_and_marks_the_first_step() {
        let routine = started();
        assert_eq!(routine.status, RoutineStatus::Active);
        assert_eq!(routine.current_activity_index, 0);
        assert_eq!(routine.activities[0].status, ActivityStatus::InProgress);
        assert!(routine.started_at.is_some());
    }

    #[test]
    fn starting_an_active_routine_changes_nothing() {
        let mut routine = started();
        complete_at(&mut routine, 0, Utc::now()).unwrap();
        let index_before = routine.current_activity_index;

        assert_eq!(start(&mut routine, Utc::now()), StartOutcome::AlreadyActive);
        assert_eq!(routine.current_activity_index, index_before);
        assert_eq!(routine.progress_percent(), 33.3);
    }

    #[test]
    fn completion_advances_the_pointer_in_order() {
        let mut routine = started();

        let outcome = complete_at(&mut routine, 0, Utc::now()).unwrap();
        assert_eq!(
            outcome,
            CompleteOutcome::Advanced {
                completed_position: 0,
                next_position: Some(1),
                routine_completed: false,
            }
        );
        assert_eq!(routine.current_activity_index, 1);
        assert_eq!(routine.activities[1].status, ActivityStatus::InProgress);
        assert_eq!(routine.progress_percent(), 33.3);
    }

    #[test]
    fn completing_twice_is_idempotent() {
        let mut routine = started();
        complete_at(&mut routine, 0, Utc::now()).unwrap();
        let stamp = routine.activities[0].completed_at;

        let again = complete_at(&mut routine, 0, Utc::now()).unwrap();
        assert_eq!(again, CompleteOutcome::AlreadyCompleted);
        assert_eq!(routine.activities[0].completed_at, stamp);
        assert_eq!(routine.progress_percent(), 33.3);
        assert_eq!(routine.current_activity_index, 1);
    }

    #[test]
    fn out_of_order_completion_keeps_the_pointer_on_the_first_open_step() {
        let mut routine = started();

        // Step 2 reported before step 1.
        complete_at(&mut routine, 1, Utc::now()).unwrap();
        assert_eq!(routine.current_activity_index, 0);
        assert_eq!(routine.progress_percent(), 33.3);

        complete_at(&mut routine, 0, Utc::now()).unwrap();
        assert_eq!(routine.current_activity_index, 2);
    }

    #[test]
    fn progress_is_monotonic_across_completions() {
        let mut routine = started();
        let mut last = routine.progress_percent();
        for position in [1, 0, 0, 2] {
            complete_at(&mut routine, position, Utc::now()).unwrap();
            let now = routine.progress_percent();
            assert!(now >= last, "progress regressed: {last} -> {now}");
            last = now;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn routine_completes_only_after_the_last_step() {
        let mut routine = started();

        complete_at(&mut routine, 0, Utc::now()).unwrap();
        complete_at(&mut routine, 1, Utc::now()).unwrap();
        assert_eq!(routine.status, RoutineStatus::Active);
        assert!(routine.progress_percent() < 100.0);

        let outcome = complete_at(&mut routine, 2, Utc::now()).unwrap();
        assert_eq!(
            outcome,
            CompleteOutcome::Advanced {
                completed_position: 2,
                next_position: None,
                routine_completed: true,
            }
        );
        assert_eq!(routine.status, RoutineStatus::Completed);
        assert_eq!(routine.progress_percent(), 100.0);
        assert!(routine.completed_at.is_some());

        // Re-reporting the last step after the routine finished is still
        // the idempotent success path, not an invalid-state rejection.
        let again = complete_at(&mut routine, 2, Utc::now()).unwrap();
        assert_eq!(again, CompleteOutcome::AlreadyCompleted);
        assert_eq!(routine.status, RoutineStatus::Completed);
    }

    #[test]
    fn completing_on_a_paused_routine_is_rejected() {
        let mut routine = started();
        pause(&mut routine).unwrap();

        let err = complete_at(&mut routine, 0, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("Paused"));
        assert_eq!(routine.activities[0].status, ActivityStatus::InProgress);
    }

    #[test]
    fn pause_and_resume_preserve_position() {
        let mut routine = started();
        complete_at(&mut routine, 0, Utc::now()).unwrap();

        pause(&mut routine).unwrap();
        assert_eq!(routine.status, RoutineStatus::Paused);
        assert_eq!(routine.current_activity_index, 1);

        resume(&mut routine).unwrap();
        assert_eq!(routine.status, RoutineStatus::Active);
        assert_eq!(routine.current_activity().unwrap().name, "Get Dressed");
    }

    #[test]
    fn resume_requires_paused() {
        let mut routine = started();
        assert!(resume(&mut routine).is_err());
    }

    #[test]
    fn restart_resets_activities_and_bumps_the_cycle() {
        let mut routine = started();
        for position in 0..3 {
            complete_at(&mut routine, position, Utc::now()).unwrap();
        }
        assert_eq!(routine.status, RoutineStatus::Completed);

        let outcome = start(&mut routine, Utc::now());
        assert_eq!(outcome, StartOutcome::Started { restarted: true });
        assert_eq!(routine.cycle, 1);
        assert_eq!(routine.status, RoutineStatus::Active);
        assert_eq!(routine.current_activity_index, 0);
        assert_eq!(routine.progress_percent(), 0.0);
        assert_eq!(routine.activities[0].status, ActivityStatus::InProgress);
        assert_eq!(routine.activities[1].status, ActivityStatus::NotStarted);
    }

    #[test]
    fn skip_advances_without_counting_toward_progress() {
        let mut routine = started();

        let outcome = skip_at(&mut routine, 0, Utc::now()).unwrap();
        assert_eq!(
            outcome,
            SkipOutcome::Skipped {
                skipped_position: 0,
                next_position: Some(1),
                routine_completed: false,
            }
        );
        assert_eq!(routine.progress_percent(), 0.0);
        assert_eq!(routine.current_activity_index, 1);
    }

    #[test]
    fn a_skipped_step_can_still_be_completed_later() {
        let mut routine = started();
        skip_at(&mut routine, 0, Utc::now()).unwrap();

        let outcome = complete_at(&mut routine, 0, Utc::now()).unwrap();
        assert!(matches!(outcome, CompleteOutcome::Advanced { .. }));
        assert_eq!(routine.activities[0].status, ActivityStatus::Completed);
        assert_eq!(routine.progress_percent(), 33.3);
    }

    #[test]
    fn a_fully_skipped_tail_still_terminates_the_routine() {
        let mut routine = started();
        complete_at(&mut routine, 0, Utc::now()).unwrap();
        skip_at(&mut routine, 1, Utc::now()).unwrap();
        let outcome = skip_at(&mut routine, 2, Utc::now()).unwrap();

        assert!(matches!(
            outcome,
            SkipOutcome::Skipped {
                routine_completed: true,
                ..
            }
        ));
        assert_eq!(routine.status, RoutineStatus::Completed);
        assert_eq!(routine.progress_percent(), 33.3);
    }

    #[test]
    fn progress_read_matches_the_preceding_mutation() {
        let mut routine = started();
        complete_at(&mut routine, 0, Utc::now()).unwrap();

        let summary = progress(&routine);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.remaining, 2);
        assert_eq!(summary.percent, 33.3);
        assert_eq!(summary.current_activity.as_deref(), Some("Get Dressed"));
        assert_eq!(summary.status, RoutineStatus::Active);
    }

    #[test]
    fn order_conservation_after_n_in_order_completions() {
        let mut routine = started();
        for n in 0..routine.activities.len() {
            assert_eq!(routine.current_activity_index, n);
            complete_at(&mut routine, n, Utc::now()).unwrap();
        }
        assert_eq!(routine.current_activity_index, routine.activities.len());
    }
}
