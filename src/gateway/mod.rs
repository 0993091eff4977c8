//! Persistence gateway: CRUD over tasks, users and roles.
//!
//! Two backends implement [`PersistenceGateway`]: [`rest::RestGateway`] talks
//! to a PostgREST-style HTTP backend, [`local::LocalGateway`] keeps everything
//! in a JSON file (or purely in memory).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::fields::Status;
use crate::role::RoleRecord;
use crate::task::{Evidence, Task, TaskDraft};
use crate::user::{User, UserDraft};

pub mod local;
pub mod rest;

/// Errors raised by a gateway backend.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The record addressed by id does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A record with the same key already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("backend error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The backend answered 2xx but the body could not be read.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("local database I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The call did not finish within the configured timeout.
    #[error("request timed out")]
    Timeout,
}

impl GatewayError {
    /// Whether a failed write might nevertheless have been applied.
    pub fn may_have_applied(&self) -> bool {
        match self {
            GatewayError::Request(e) => !(e.is_connect() || e.is_builder() || e.is_redirect()),
            // The proxy gave up; the backend may still have committed.
            GatewayError::Status { status, .. } => matches!(status, 502 | 504),
            GatewayError::Decode(_) | GatewayError::Timeout => true,
            GatewayError::NotFound { .. } | GatewayError::Conflict(_) | GatewayError::Io(_) => false,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Shared handle to whichever backend is configured.
pub type Gateway = Arc<dyn PersistenceGateway>;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Short backend description for logs and `wb stats`.
    fn describe(&self) -> String;

    /// All tasks, or only those in `role_category`.
    async fn list_tasks(&self, role_category: Option<&str>) -> GatewayResult<Vec<Task>>;

    async fn get_task(&self, id: u64) -> GatewayResult<Task>;

    /// Create a task from a validated draft. The backend assigns the id.
    async fn create_task(&self, draft: &TaskDraft) -> GatewayResult<Task>;

    /// Insert a task with a caller-chosen id. Duplicate ids are `Conflict`.
    async fn insert_task(&self, task: &Task) -> GatewayResult<Task>;

    /// Overwrite every field of an existing task.
    async fn replace_task(&self, task: &Task) -> GatewayResult<Task>;

    async fn patch_task_status(&self, id: u64, status: Status) -> GatewayResult<()>;

    async fn patch_task_response(&self, id: u64, text: &str) -> GatewayResult<()>;

    /// Replace the whole evidence array of a task.
    async fn patch_task_evidence(&self, id: u64, evidence: &[Evidence]) -> GatewayResult<()>;

    async fn list_users(&self) -> GatewayResult<Vec<User>>;

    /// Create a user from a validated draft. The backend assigns the id.
    async fn create_user(&self, draft: &UserDraft) -> GatewayResult<User>;

    /// Insert a user with a caller-chosen id. Duplicate ids are `Conflict`.
    async fn insert_user(&self, user: &User) -> GatewayResult<User>;

    async fn update_user(&self, user: &User) -> GatewayResult<User>;

    async fn delete_user(&self, id: u64) -> GatewayResult<()>;

    /// Distinct role identifiers referenced by users.
    async fn list_role_identifiers(&self) -> GatewayResult<Vec<String>>;

    /// Full role records from the role store, if the backend has one.
    async fn list_roles(&self) -> GatewayResult<Vec<RoleRecord>>;

    /// Insert a role. Duplicate ids are `Conflict`.
    async fn save_role(&self, role: &RoleRecord) -> GatewayResult<RoleRecord>;

    async fn update_role(&self, role: &RoleRecord) -> GatewayResult<RoleRecord>;
}

/// Millisecond timestamp used as a client-side id.
pub fn timestamp_id() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_ambiguity_by_error_kind() {
        assert!(GatewayError::Timeout.may_have_applied());
        assert!(GatewayError::Status { status: 504, body: String::new() }.may_have_applied());
        assert!(!GatewayError::Status { status: 400, body: String::new() }.may_have_applied());
        assert!(!GatewayError::Conflict("dup".into()).may_have_applied());
        assert!(!GatewayError::NotFound { entity: "task", id: "1".into() }.may_have_applied());
    }

    #[test]
    fn timestamp_ids_increase() {
        let a = timestamp_id();
        let b = timestamp_id();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }
}
