use serde::{Deserialize, Serialize};

/// Structured error body — designed for the conversational layer, not humans.
/// Failures never cross the engine boundary as panics; callers always get a
/// result object with enough information to pick a graceful fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. "routine_not_found")
    pub error: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// Which input caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            field: None,
            received: None,
            docs_hint: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_received(mut self, received: serde_json::Value) -> Self {
        self.received = Some(received);
        self
    }

    pub fn with_docs_hint(mut self, hint: impl Into<String>) -> Self {
        self.docs_hint = Some(hint.into());
        self
    }
}

/// Error codes used across the engine
pub mod codes {
    pub const ROUTINE_NOT_FOUND: &str = "routine_not_found";
    pub const ACTIVITY_NOT_FOUND: &str = "activity_not_found";
    pub const INVALID_STATE: &str = "invalid_state";
    pub const CHILD_MISMATCH: &str = "child_mismatch";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const STORAGE_FAILED: &str = "storage_failed";
}
