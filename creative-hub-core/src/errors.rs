//! Error types shared by the workflow, pipeline and provider layers

use crate::models::StageId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed, machine-readable classification of every [`HubError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input
    Validation,
    /// Unknown workflow, session, step or template
    NotFound,
    /// Step type with no registered executor
    UnknownStepType,
    /// Navigation that the state machine refuses
    InvalidTransition,
    /// Invocation cancelled before it completed
    Cancelled,
    /// Result arrived for a superseded invocation
    Stale,
    /// Provider (and its fallback) failed
    Upstream,
    /// Time budget exceeded
    Timeout,
    /// Anything else
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::UnknownStepType => "unknown_step_type",
            Self::InvalidTransition => "invalid_transition",
            Self::Cancelled => "cancelled",
            Self::Stale => "stale",
            Self::Upstream => "upstream",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for creative hub operations
#[derive(Debug, Clone, Error)]
pub enum HubError {
    /// Request input failed validation
    #[error("{0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("{what} not found: {id}")]
    NotFound {
        /// Kind of entity ("Workflow", "Session", ...)
        what: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Step type has no executor
    #[error("Unknown step type: {0}")]
    UnknownStepType(String),

    /// Navigation refused by the state machine
    #[error("Cannot move from stage '{from}' to stage '{to}'")]
    InvalidTransition {
        /// Stage the session was on
        from: StageId,
        /// Requested stage
        to: StageId,
    },

    /// Invocation was cancelled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Result discarded because the session moved on
    #[error("Discarded stale result for stage '{stage}'")]
    Stale {
        /// Stage the discarded result belonged to
        stage: StageId,
    },

    /// Upstream provider failure that could not be recovered
    #[error("Upstream provider error: {0}")]
    Upstream(String),

    /// Operation exceeded its time budget
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Shorthand for a not-found error
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Shorthand for a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Machine-readable kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::UnknownStepType(_) => ErrorKind::UnknownStepType,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Stale { .. } => ErrorKind::Stale,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code used when the error reaches the API layer
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::UnknownStepType => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidTransition | ErrorKind::Cancelled | ErrorKind::Stale => 409,
            ErrorKind::Upstream => 502,
            ErrorKind::Timeout => 504,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether the error came from cancellation or supersession rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Cancelled | ErrorKind::Stale)
    }
}

/// Result alias used across the core library
pub type HubResult<T> = Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_status_mapping() {
        let err = HubError::not_found("Workflow", "wf-1");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "Workflow not found: wf-1");

        let err = HubError::UnknownStepType("teleport".to_string());
        assert_eq!(err.status_code(), 400);

        let err = HubError::InvalidTransition {
            from: StageId::Story,
            to: StageId::Edit,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::UnknownStepType).unwrap();
        assert_eq!(json, r#""unknown_step_type""#);
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
    }

    #[test]
    fn test_cancellation_classification() {
        assert!(HubError::Stale {
            stage: StageId::Script
        }
        .is_cancellation());
        assert!(!HubError::Upstream("boom".to_string()).is_cancellation());
    }
}
