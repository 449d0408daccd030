use serde_json::json;
use uuid::Uuid;

use sprout_core::error::{ErrorBody, codes};
use sprout_core::routine::RoutineStatus;

use crate::store::StoreError;

/// Engine failure taxonomy. None of these cross the library boundary as a
/// panic — the action handler converts them into an [`ErrorBody`] on the
/// outcome object, and no failure leaves stored state partially written.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("routine {0} not found")]
    RoutineNotFound(Uuid),
    #[error("no routine named '{name}' for this child")]
    RoutineNameNotFound { name: String },
    #[error("no activity in '{routine}' matches '{text}'")]
    ActivityNotFound { routine: String, text: String },
    #[error("routine '{routine}' is {status:?}, cannot {action}")]
    InvalidState {
        routine: String,
        status: RoutineStatus,
        action: &'static str,
    },
    #[error("routine '{routine}' belongs to another child")]
    ChildMismatch { routine: String },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// The structured body handed back to callers.
    pub fn body(&self) -> ErrorBody {
        match self {
            EngineError::RoutineNotFound(id) => {
                ErrorBody::new(codes::ROUTINE_NOT_FOUND, format!("Routine {id} does not exist"))
                    .with_field("routine_id")
                    .with_received(json!(id.to_string()))
            }
            EngineError::RoutineNameNotFound { name } => ErrorBody::new(
                codes::ROUTINE_NOT_FOUND,
                format!("No routine named '{name}' for this child"),
            )
            .with_field("routine_name")
            .with_received(json!(name))
            .with_docs_hint(
                "Routine names match case-insensitively; a partial name is accepted \
                 when it identifies exactly one routine.",
            ),
            EngineError::ActivityNotFound { routine, text } => ErrorBody::new(
                codes::ACTIVITY_NOT_FOUND,
                format!("Nothing in '{routine}' matches '{text}'"),
            )
            .with_field("activity")
            .with_received(json!(text))
            .with_docs_hint(
                "The message matched no step by keyword, similarity, or reference, \
                 and no single in-progress step was left to default to. \
                 No state was changed.",
            ),
            EngineError::InvalidState {
                routine,
                status,
                action,
            } => ErrorBody::new(
                codes::INVALID_STATE,
                format!("Routine '{routine}' is {status:?}; cannot {action}"),
            )
            .with_docs_hint("Start or resume the routine first."),
            EngineError::ChildMismatch { routine } => ErrorBody::new(
                codes::CHILD_MISMATCH,
                format!("Routine '{routine}' belongs to another child"),
            ),
            EngineError::Storage(err) => ErrorBody::new(codes::STORAGE_FAILED, err.to_string()),
        }
    }
}
