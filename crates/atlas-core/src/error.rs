// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for atlas-core.
//!
//! Every error carries a machine-readable code so upstream callers can route
//! user-visible responses without string matching.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// How the runtime reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Validated before any side effect. Surfaced directly to the caller.
    PreconditionFailed,
    /// A collaborator I/O error. Surfaced upward; retry policy is the caller's.
    TransientExternalFailure,
    /// A pending step exceeded its deadline. The saga compensates.
    StepTimeout,
    /// A compensator reported failure. The saga is terminal and needs an operator.
    CompensationFailure,
    /// Duplicate or out-of-order input. Discarded with a warning.
    Invariant,
}

/// Core errors that can occur while driving sagas.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Saga was not found in the store.
    SagaNotFound {
        /// The transaction id that was not found.
        transaction_id: String,
    },

    /// Saga already exists (duplicate submission).
    SagaAlreadyExists {
        /// The transaction id that already exists.
        transaction_id: String,
    },

    /// A step status transition is not allowed.
    InvalidTransition {
        /// The step being transitioned.
        step_id: String,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Step id already present in the saga.
    DuplicateStep {
        /// The duplicated step id.
        step_id: String,
    },

    /// Step list violates a structural invariant.
    InconsistentSaga {
        /// The transaction id.
        transaction_id: String,
        /// What is wrong.
        reason: String,
    },

    /// A pending step exceeded the saga deadline.
    StepTimeout {
        /// The transaction id.
        transaction_id: String,
        /// The step that timed out.
        step_id: String,
    },

    /// A compensating command reported failure.
    CompensationFailed {
        /// The transaction id.
        transaction_id: String,
        /// The step whose compensation failed.
        step_id: String,
        /// The reason for failure.
        reason: String,
    },

    /// Optimistic concurrency check failed on update.
    VersionConflict {
        /// The transaction id.
        transaction_id: String,
        /// The version the writer expected to replace.
        expected: i32,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// Message bus operation failed.
    BusError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SagaNotFound { .. } => "SAGA_NOT_FOUND",
            Self::SagaAlreadyExists { .. } => "SAGA_ALREADY_EXISTS",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::DuplicateStep { .. } => "DUPLICATE_STEP",
            Self::InconsistentSaga { .. } => "INCONSISTENT_SAGA",
            Self::StepTimeout { .. } => "STEP_TIMEOUT",
            Self::CompensationFailed { .. } => "COMPENSATION_FAILED",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
            Self::BusError { .. } => "BUS_ERROR",
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SagaNotFound { .. }
            | Self::SagaAlreadyExists { .. }
            | Self::DuplicateStep { .. }
            | Self::ValidationError { .. } => ErrorKind::PreconditionFailed,
            Self::InvalidTransition { .. }
            | Self::InconsistentSaga { .. }
            | Self::VersionConflict { .. } => ErrorKind::Invariant,
            Self::StepTimeout { .. } => ErrorKind::StepTimeout,
            Self::CompensationFailed { .. } => ErrorKind::CompensationFailure,
            Self::DatabaseError { .. } | Self::BusError { .. } => {
                ErrorKind::TransientExternalFailure
            }
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SagaNotFound { transaction_id } => {
                write!(f, "Saga '{}' not found", transaction_id)
            }
            Self::SagaAlreadyExists { transaction_id } => {
                write!(f, "Saga '{}' already exists", transaction_id)
            }
            Self::InvalidTransition { step_id, from, to } => {
                write!(
                    f,
                    "Step '{}' cannot transition from '{}' to '{}'",
                    step_id, from, to
                )
            }
            Self::DuplicateStep { step_id } => {
                write!(f, "Step id '{}' already exists in saga", step_id)
            }
            Self::InconsistentSaga {
                transaction_id,
                reason,
            } => {
                write!(f, "Saga '{}' is inconsistent: {}", transaction_id, reason)
            }
            Self::StepTimeout {
                transaction_id,
                step_id,
            } => {
                write!(
                    f,
                    "Step '{}' of saga '{}' timed out",
                    step_id, transaction_id
                )
            }
            Self::CompensationFailed {
                transaction_id,
                step_id,
                reason,
            } => {
                write!(
                    f,
                    "Compensation of step '{}' in saga '{}' failed: {}",
                    step_id, transaction_id, reason
                )
            }
            Self::VersionConflict {
                transaction_id,
                expected,
            } => {
                write!(
                    f,
                    "Saga '{}' was modified concurrently (expected version {})",
                    transaction_id, expected
                )
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
            Self::BusError { operation, details } => {
                write!(f, "Message bus error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(err: redis::RedisError) -> Self {
        CoreError::BusError {
            operation: "redis".to_string(),
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_codes_and_kinds() {
        let test_cases = vec![
            (
                CoreError::SagaNotFound {
                    transaction_id: "tx".to_string(),
                },
                "SAGA_NOT_FOUND",
                ErrorKind::PreconditionFailed,
            ),
            (
                CoreError::InvalidTransition {
                    step_id: "s1".to_string(),
                    from: "completed".to_string(),
                    to: "pending".to_string(),
                },
                "INVALID_TRANSITION",
                ErrorKind::Invariant,
            ),
            (
                CoreError::StepTimeout {
                    transaction_id: "tx".to_string(),
                    step_id: "s1".to_string(),
                },
                "STEP_TIMEOUT",
                ErrorKind::StepTimeout,
            ),
            (
                CoreError::CompensationFailed {
                    transaction_id: "tx".to_string(),
                    step_id: "s1".to_string(),
                    reason: "asset service rejected".to_string(),
                },
                "COMPENSATION_FAILED",
                ErrorKind::CompensationFailure,
            ),
            (
                CoreError::DatabaseError {
                    operation: "insert".to_string(),
                    details: "connection refused".to_string(),
                },
                "DATABASE_ERROR",
                ErrorKind::TransientExternalFailure,
            ),
            (
                CoreError::BusError {
                    operation: "publish".to_string(),
                    details: "broken pipe".to_string(),
                },
                "BUS_ERROR",
                ErrorKind::TransientExternalFailure,
            ),
        ];

        for (error, expected_code, expected_kind) in test_cases {
            assert_eq!(
                error.error_code(),
                expected_code,
                "Error {:?} should have code {}",
                error,
                expected_code
            );
            assert_eq!(error.kind(), expected_kind);
            assert!(!error.to_string().is_empty(), "Message should not be empty");
        }
    }

    #[test]
    fn test_core_error_display() {
        let err = CoreError::SagaNotFound {
            transaction_id: "abc-123".to_string(),
        };
        assert_eq!(err.to_string(), "Saga 'abc-123' not found");

        let err = CoreError::InvalidTransition {
            step_id: "step-1".to_string(),
            from: "completed".to_string(),
            to: "pending".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Step 'step-1' cannot transition from 'completed' to 'pending'"
        );

        let err = CoreError::VersionConflict {
            transaction_id: "abc-123".to_string(),
            expected: 4,
        };
        assert_eq!(
            err.to_string(),
            "Saga 'abc-123' was modified concurrently (expected version 4)"
        );

        let err = CoreError::ValidationError {
            field: "steps".to_string(),
            message: "must not be empty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Validation error for 'steps': must not be empty"
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let err: CoreError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }
}
