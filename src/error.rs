//! Error taxonomy for board operations.
//!
//! Validation errors are raised before any network call. Gateway failures are
//! caught at the operation boundary and converted into [`BoardError`], which
//! records whether a failed write definitely did not happen or may have
//! happened anyway.

use serde::Serialize;

use crate::gateway::GatewayError;
use crate::role_repo::RepoError;

/// What the caller can conclude about a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The operation did not take effect.
    Failed,
    /// The write may have reached the backend; reload to find out.
    Unknown,
}

/// Whether an operation reads or mutates backend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Errors surfaced by board operations.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// A required field is missing or malformed. No request was sent.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// The referenced record does not exist in the backing store.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The mutation is blocked by existing references or a duplicate key.
    #[error("{0}")]
    Conflict(String),

    /// The backend could not be reached or answered with an error.
    #[error("{operation} failed: {source}")]
    Transport {
        operation: &'static str,
        outcome: Outcome,
        #[source]
        source: GatewayError,
    },

    /// The local role cache could not be read or written.
    #[error("local role store: {0}")]
    LocalStore(#[from] RepoError),
}

impl BoardError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BoardError::Validation { field, message: message.into() }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BoardError::NotFound { entity, id: id.to_string() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        BoardError::Conflict(message.into())
    }

    /// Convert a gateway failure raised while performing `operation`.
    pub fn from_gateway(operation: &'static str, access: Access, err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound { entity, id } => BoardError::NotFound { entity, id },
            GatewayError::Conflict(message) => BoardError::Conflict(message),
            other => {
                let outcome = if access == Access::Write && other.may_have_applied() {
                    Outcome::Unknown
                } else {
                    Outcome::Failed
                };
                tracing::error!(operation, ?outcome, error = %other, "gateway call failed");
                BoardError::Transport { operation, outcome, source: other }
            }
        }
    }

    /// `Unknown` only for transport failures on writes that may have landed.
    pub fn outcome(&self) -> Outcome {
        match self {
            BoardError::Transport { outcome, .. } => *outcome,
            _ => Outcome::Failed,
        }
    }

    /// Message suitable for showing to a person.
    pub fn user_message(&self) -> String {
        match self {
            BoardError::Transport { operation, outcome: Outcome::Unknown, source } => format!(
                "{operation} may or may not have been saved ({source}); outcome unknown, please refresh"
            ),
            BoardError::Transport { operation, outcome: Outcome::Failed, source } => {
                format!("{operation} failed and nothing was changed: {source}")
            }
            BoardError::Validation { field, message } => format!("Missing or invalid {field}: {message}"),
            other => other.to_string(),
        }
    }
}

/// Structured result returned at the command boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OperationReport {
    pub fn ok(message: impl Into<String>) -> Self {
        OperationReport { success: true, error: None, outcome: None, message: Some(message.into()) }
    }

    pub fn failed(err: &BoardError) -> Self {
        OperationReport {
            success: false,
            error: Some(err.user_message()),
            outcome: Some(err.outcome()),
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_not_found_maps_to_not_found() {
        let err = BoardError::from_gateway(
            "update status",
            Access::Write,
            GatewayError::NotFound { entity: "task", id: "9".into() },
        );
        assert!(matches!(err, BoardError::NotFound { entity: "task", .. }));
        assert_eq!(err.outcome(), Outcome::Failed);
    }

    #[test]
    fn timeouts_on_writes_are_ambiguous() {
        let err = BoardError::from_gateway("add evidence", Access::Write, GatewayError::Timeout);
        assert_eq!(err.outcome(), Outcome::Unknown);
        assert!(err.user_message().contains("outcome unknown, please refresh"));
    }

    #[test]
    fn timeouts_on_reads_are_plain_failures() {
        let err = BoardError::from_gateway("list tasks", Access::Read, GatewayError::Timeout);
        assert_eq!(err.outcome(), Outcome::Failed);
        assert!(!err.user_message().contains("outcome unknown"));
    }

    #[test]
    fn rejected_writes_are_definite() {
        let err = BoardError::from_gateway(
            "create task",
            Access::Write,
            GatewayError::Status { status: 400, body: "bad column".into() },
        );
        assert_eq!(err.outcome(), Outcome::Failed);
    }

    #[test]
    fn report_serializes_failure_shape() {
        let report = OperationReport::failed(&BoardError::validation("title", "a task needs a title"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["outcome"], "failed");
        assert!(json["error"].as_str().unwrap().contains("title"));
    }
}
