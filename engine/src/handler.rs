//! The action handler: classifier → resolver → state machine → store,
//! behind the two chat commands plus pause/resume/skip/progress.
//!
//! Every method returns a structured outcome with an optional `error` body;
//! nothing here panics across the boundary, and no failure leaves stored
//! state partially written.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use sprout_core::error::ErrorBody;
use sprout_core::log::{ActivityLogEntry, LogSource};
use sprout_core::routine::{Routine, RoutineSnapshot, RoutineStatus};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::intent::{
    self, CompletionSignal, ConfidenceBand, ConfidenceSignals, Intent,
};
use crate::machine::{self, CompleteOutcome, RoutineProgress, SkipOutcome, StartOutcome};
use crate::resolver::{self, MatchSource, normalize_message};
use crate::store::{LogAppend, RoutineStore};

/// Orchestrates the classifier, resolver and state machine for one
/// conversation turn at a time. Collaborators are injected at construction;
/// the engine keeps no global state.
pub struct RoutineActions<S: RoutineStore> {
    store: S,
    config: EngineConfig,
}

/// What the engine understood about one inbound message. Analysis only —
/// computing it never mutates routine state.
#[derive(Debug, Clone, Serialize)]
pub struct MessageAnalysis {
    pub intent: Intent,
    pub completion_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_activity: Option<String>,
    pub confidence: f64,
    pub confidence_band: ConfidenceBand,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteActivityOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_activity: Option<String>,
    pub progress: f64,
    pub routine_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl CompleteActivityOutcome {
    fn failure(err: &EngineError, progress: f64, routine_completed: bool) -> Self {
        Self {
            success: false,
            completed_activity: None,
            next_activity: None,
            progress,
            routine_completed,
            error: Some(err.body()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkipActivityOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_activity: Option<String>,
    pub progress: f64,
    pub routine_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl SkipActivityOutcome {
    fn failure(err: &EngineError, progress: f64, routine_completed: bool) -> Self {
        Self {
            success: false,
            skipped_activity: None,
            next_activity: None,
            progress,
            routine_completed,
            error: Some(err.body()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartRoutineOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_activity: Option<String>,
    pub total_activities: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl StartRoutineOutcome {
    fn failure(err: &EngineError) -> Self {
        Self {
            success: false,
            routine_id: None,
            first_activity: None,
            total_activities: 0,
            error: Some(err.body()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PauseResumeOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RoutineStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl PauseResumeOutcome {
    fn failure(err: &EngineError) -> Self {
        Self {
            success: false,
            status: None,
            current_activity: None,
            error: Some(err.body()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutineProgressOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<RoutineProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<S: RoutineStore> RoutineActions<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Read access for callers that own the composition root (and for
    /// tests asserting on the activity log).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Classify one message against the caller-supplied routine snapshot.
    /// Pure analysis: no state is read from or written to the store.
    pub fn process_message(
        &self,
        message: &str,
        child_id: Uuid,
        snapshot: Option<&RoutineSnapshot>,
    ) -> MessageAnalysis {
        let signal = intent::completion_signal(message);
        let completion_detected = signal.is_some();

        let resolved = snapshot.and_then(|snap| {
            resolver::resolve_activity(message, snap, completion_detected, &self.config)
        });

        let intent = intent::determine_intent(
            message,
            completion_detected,
            resolved.as_ref().map(|found| found.name.as_str()),
            snapshot.is_some(),
        );

        let explicit_phrase = match intent {
            Intent::CompleteActivity => matches!(
                signal,
                Some(CompletionSignal::Phrase | CompletionSignal::Pattern)
            ),
            Intent::StartRoutine => true,
            Intent::ActivityInquiry | Intent::GeneralChat => false,
        };
        let confidence = intent::calculate_confidence(
            intent,
            ConfidenceSignals {
                explicit_phrase,
                resolved_activity: resolved.is_some(),
                strong_keyword: matches!(
                    resolved.as_ref().map(|found| found.source),
                    Some(MatchSource::Keyword)
                ),
            },
            self.config.base_confidence,
        );

        tracing::debug!(
            child_id = %child_id,
            intent = ?intent,
            completion_detected,
            confidence,
            "message analyzed"
        );

        MessageAnalysis {
            intent,
            completion_detected,
            extracted_activity: resolved.map(|found| found.name),
            confidence,
            confidence_band: intent::confidence_band(confidence),
        }
    }

    /// Complete the activity `text` names (or refers to) on a routine.
    ///
    /// The resolver ladder runs first, including its fallback rules; only
    /// when nothing resolves does this report `activity_not_found`. A repeat
    /// of an already-completed activity succeeds without state change or a
    /// second log entry.
    pub fn complete_activity(
        &mut self,
        routine_id: Uuid,
        text: &str,
        source: LogSource,
    ) -> CompleteActivityOutcome {
        let mut routine = match self.fetch_routine(routine_id) {
            Ok(routine) => routine,
            Err(err) => return CompleteActivityOutcome::failure(&err, 0.0, false),
        };

        let snapshot = routine.snapshot();
        let Some(resolved) =
            resolver::resolve_activity(text, &snapshot, true, &self.config)
        else {
            tracing::warn!(routine_id = %routine_id, text, "no activity resolved");
            let err = EngineError::ActivityNotFound {
                routine: routine.name.clone(),
                text: text.to_string(),
            };
            return CompleteActivityOutcome::failure(
                &err,
                routine.progress_percent(),
                routine.status == RoutineStatus::Completed,
            );
        };

        let now = Utc::now();
        match machine::complete_at(&mut routine, resolved.position, now) {
            Ok(CompleteOutcome::AlreadyCompleted) => CompleteActivityOutcome {
                success: true,
                completed_activity: Some(resolved.name),
                next_activity: routine
                    .current_activity()
                    .map(|activity| activity.name.clone()),
                progress: routine.progress_percent(),
                routine_completed: routine.status == RoutineStatus::Completed,
                error: None,
            },
            Ok(CompleteOutcome::Advanced {
                completed_position,
                next_position,
                routine_completed,
            }) => {
                let activity = &routine.activities[completed_position];
                let entry = ActivityLogEntry::new(
                    routine.id,
                    routine.child_id,
                    activity.id,
                    activity.name.clone(),
                    routine.cycle,
                    now,
                    source,
                );

                // Routine state first, then the log entry.
                if let Err(err) = self.store.persist_routine(&routine) {
                    return CompleteActivityOutcome::failure(
                        &EngineError::from(err),
                        routine.progress_percent(),
                        routine_completed,
                    );
                }
                match self.store.append_log(entry) {
                    Ok(LogAppend::Appended) => {}
                    Ok(LogAppend::Duplicate) => {
                        tracing::debug!(routine_id = %routine_id, "duplicate completion log suppressed");
                    }
                    Err(err) => {
                        return CompleteActivityOutcome::failure(
                            &EngineError::from(err),
                            routine.progress_percent(),
                            routine_completed,
                        );
                    }
                }

                CompleteActivityOutcome {
                    success: true,
                    completed_activity: Some(
                        routine.activities[completed_position].name.clone(),
                    ),
                    next_activity: next_position
                        .map(|position| routine.activities[position].name.clone()),
                    progress: routine.progress_percent(),
                    routine_completed,
                    error: None,
                }
            }
            Err(err) => CompleteActivityOutcome::failure(
                &err,
                routine.progress_percent(),
                routine.status == RoutineStatus::Completed,
            ),
        }
    }

    /// Skip the activity `text` names. Advances the routine like a
    /// completion but records nothing in the activity log.
    pub fn skip_activity(&mut self, routine_id: Uuid, text: &str) -> SkipActivityOutcome {
        let mut routine = match self.fetch_routine(routine_id) {
            Ok(routine) => routine,
            Err(err) => return SkipActivityOutcome::failure(&err, 0.0, false),
        };

        let snapshot = routine.snapshot();
        let Some(resolved) = resolver::resolve_activity(text, &snapshot, true, &self.config)
        else {
            let err = EngineError::ActivityNotFound {
                routine: routine.name.clone(),
                text: text.to_string(),
            };
            return SkipActivityOutcome::failure(
                &err,
                routine.progress_percent(),
                routine.status == RoutineStatus::Completed,
            );
        };

        match machine::skip_at(&mut routine, resolved.position, Utc::now()) {
            Ok(SkipOutcome::AlreadyClosed) => SkipActivityOutcome {
                success: true,
                skipped_activity: Some(resolved.name),
                next_activity: routine
                    .current_activity()
                    .map(|activity| activity.name.clone()),
                progress: routine.progress_percent(),
                routine_completed: routine.status == RoutineStatus::Completed,
                error: None,
            },
            Ok(SkipOutcome::Skipped {
                skipped_position,
                next_position,
                routine_completed,
            }) => {
                if let Err(err) = self.store.persist_routine(&routine) {
                    return SkipActivityOutcome::failure(
                        &EngineError::from(err),
                        routine.progress_percent(),
                        routine_completed,
                    );
                }
                SkipActivityOutcome {
                    success: true,
                    skipped_activity: Some(routine.activities[skipped_position].name.clone()),
                    next_activity: next_position
                        .map(|position| routine.activities[position].name.clone()),
                    progress: routine.progress_percent(),
                    routine_completed,
                    error: None,
                }
            }
            Err(err) => SkipActivityOutcome::failure(
                &err,
                routine.progress_percent(),
                routine.status == RoutineStatus::Completed,
            ),
        }
    }

    /// Start the routine `routine_name` names for a child.
    ///
    /// Any other ACTIVE routine of the same child is deactivated first —
    /// one active routine per child keeps "current activity" unambiguous.
    pub fn start_routine(&mut self, child_id: Uuid, routine_name: &str) -> StartRoutineOutcome {
        let routines = match self.store.routines_for_child(child_id) {
            Ok(routines) => routines,
            Err(err) => return StartRoutineOutcome::failure(&EngineError::from(err)),
        };
        let Some(mut routine) = match_routine_name(routines, routine_name) else {
            tracing::warn!(child_id = %child_id, routine_name, "routine not found for child");
            return StartRoutineOutcome::failure(&EngineError::RoutineNameNotFound {
                name: routine_name.to_string(),
            });
        };
        if routine.child_id != child_id {
            return StartRoutineOutcome::failure(&EngineError::ChildMismatch {
                routine: routine.name,
            });
        }

        match self.store.active_routine(child_id) {
            Ok(Some(mut active)) if active.id != routine.id => {
                machine::deactivate(&mut active);
                if let Err(err) = self.store.persist_routine(&active) {
                    return StartRoutineOutcome::failure(&EngineError::from(err));
                }
            }
            Ok(_) => {}
            Err(err) => return StartRoutineOutcome::failure(&EngineError::from(err)),
        }

        let outcome = machine::start(&mut routine, Utc::now());
        if outcome != StartOutcome::AlreadyActive {
            if let Err(err) = self.store.persist_routine(&routine) {
                return StartRoutineOutcome::failure(&EngineError::from(err));
            }
        }

        StartRoutineOutcome {
            success: true,
            routine_id: Some(routine.id),
            first_activity: routine
                .current_activity()
                .map(|activity| activity.name.clone()),
            total_activities: routine.activities.len(),
            error: None,
        }
    }

    /// ACTIVE → PAUSED. Completed activities and the pointer are untouched.
    pub fn pause_routine(&mut self, routine_id: Uuid) -> PauseResumeOutcome {
        self.toggle(routine_id, machine::pause)
    }

    /// PAUSED → ACTIVE, picking up exactly where the routine left off.
    pub fn resume_routine(&mut self, routine_id: Uuid) -> PauseResumeOutcome {
        self.toggle(routine_id, machine::resume)
    }

    /// Pure progress read; always consistent with the last mutation.
    pub fn routine_progress(&self, routine_id: Uuid) -> RoutineProgressOutcome {
        match self.fetch_routine(routine_id) {
            Ok(routine) => RoutineProgressOutcome {
                success: true,
                progress: Some(machine::progress(&routine)),
                error: None,
            },
            Err(err) => RoutineProgressOutcome {
                success: false,
                progress: None,
                error: Some(err.body()),
            },
        }
    }

    fn toggle(
        &mut self,
        routine_id: Uuid,
        transition: fn(&mut Routine) -> Result<(), EngineError>,
    ) -> PauseResumeOutcome {
        let mut routine = match self.fetch_routine(routine_id) {
            Ok(routine) => routine,
            Err(err) => return PauseResumeOutcome::failure(&err),
        };
        if let Err(err) = transition(&mut routine) {
            return PauseResumeOutcome::failure(&err);
        }
        if let Err(err) = self.store.persist_routine(&routine) {
            return PauseResumeOutcome::failure(&EngineError::from(err));
        }
        PauseResumeOutcome {
            success: true,
            status: Some(routine.status),
            current_activity: routine
                .current_activity()
                .map(|activity| activity.name.clone()),
            error: None,
        }
    }

    fn fetch_routine(&self, routine_id: Uuid) -> Result<Routine, EngineError> {
        match self.store.routine(routine_id) {
            Ok(Some(routine)) => Ok(routine),
            Ok(None) => Err(EngineError::RoutineNotFound(routine_id)),
            Err(err) => Err(EngineError::from(err)),
        }
    }
}

/// Match a spoken routine name against the child's routines: normalized
/// equality first, then containment either way. List order (insertion
/// order) breaks residual ambiguity deterministically.
fn match_routine_name(mut routines: Vec<Routine>, wanted: &str) -> Option<Routine> {
    let wanted = normalize_message(wanted);
    if wanted.is_empty() {
        return None;
    }
    let exact = routines
        .iter()
        .position(|routine| normalize_message(&routine.name) == wanted);
    let partial = exact.or_else(|| {
        routines.iter().position(|routine| {
            let name = normalize_message(&routine.name);
            name.contains(&wanted) || wanted.contains(&name)
        })
    });
    partial.map(|index| routines.swap_remove(index))
}
