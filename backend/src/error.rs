use thiserror::Error;

use crate::progress::model::CompletionKind;

/// Caller-facing failure of a completion request.
///
/// Every variant carries the message returned to the caller. `Internal`
/// never carries store detail; that is logged where the failure happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already completed: {0}")]
    AlreadyCompleted(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl CompletionError {
    pub fn unauthenticated(kind: CompletionKind) -> Self {
        let what = match kind {
            CompletionKind::Module => "modules",
            CompletionKind::Activity => "activities",
        };
        Self::Unauthenticated(format!(
            "User must be authenticated to complete {what}."
        ))
    }

    pub fn missing_ids(kind: CompletionKind) -> Self {
        Self::InvalidArgument(match kind {
            CompletionKind::Module => "courseId and moduleId are required.".to_string(),
            CompletionKind::Activity => {
                "courseId, moduleId, and activityId are required.".to_string()
            }
        })
    }

    pub fn already_completed(kind: CompletionKind) -> Self {
        Self::AlreadyCompleted(format!("{} already completed.", kind.noun()))
    }

    pub fn module_not_found() -> Self {
        Self::NotFound("Module not found.".to_string())
    }

    pub fn activity_not_found() -> Self {
        Self::NotFound("Activity not found.".to_string())
    }

    pub fn internal(kind: CompletionKind) -> Self {
        Self::Internal(format!("Failed to complete {kind}."))
    }

    /// Wire code of the callable protocol.
    pub fn code(&self) -> &'static str {
        match self {
            CompletionError::Unauthenticated(_) => "unauthenticated",
            CompletionError::InvalidArgument(_) => "invalid-argument",
            CompletionError::AlreadyCompleted(_) => "already-exists",
            CompletionError::NotFound(_) => "not-found",
            CompletionError::Internal(_) => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CompletionError::Unauthenticated(m)
            | CompletionError::InvalidArgument(m)
            | CompletionError::AlreadyCompleted(m)
            | CompletionError::NotFound(m)
            | CompletionError::Internal(m) => m,
        }
    }
}
