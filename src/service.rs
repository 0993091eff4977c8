//! Board operations: the task lifecycle, evidence mutation and user and role
//! administration.
//!
//! Every operation validates its input before touching the gateway and turns
//! gateway failures into [`BoardError`]s at this boundary. Nothing is retried;
//! after a failed write the caller reloads and shows the real state.
//!
//! Evidence writes are read-modify-write over the whole array with no version
//! check. Two concurrent mutations on the same task can lose one of the
//! updates (last write wins).

use std::sync::Arc;

use chrono::NaiveDate;

use crate::analyzer::{AnalysisError, TextAnalyzer};
use crate::config::SettleDelays;
use crate::error::{Access, BoardError};
use crate::evidence::{self, EvidenceDraft};
use crate::fields::Status;
use crate::gateway::Gateway;
use crate::hierarchy::{check_role_deletable, check_user_deletable, RoleSet};
use crate::role::{builtin_roles, is_builtin, RoleDraft, RoleRecord};
use crate::role_repo::RoleRepository;
use crate::status::TaskStats;
use crate::task::{Evidence, Task, TaskDraft};
use crate::user::{sample_roster, User, UserDraft};

/// What kind of write just happened, for picking the settle delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Update,
    Create,
}

/// Where a user list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterSource {
    Backend,
    /// The backend list was unavailable or empty; the sample roster is shown.
    Fallback { reason: String },
}

#[derive(Debug, Clone)]
pub struct Roster {
    pub users: Vec<User>,
    pub source: RosterSource,
}

/// Outcome of pulling roles from the backend role store into the local cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct Board {
    gateway: Gateway,
    roles: RoleRepository,
    analyzer: Arc<dyn TextAnalyzer>,
    settle: SettleDelays,
}

impl Board {
    pub fn new(gateway: Gateway, roles: RoleRepository, analyzer: Arc<dyn TextAnalyzer>, settle: SettleDelays) -> Self {
        Board { gateway, roles, analyzer, settle }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Wait before reloading so the backend has caught up with the last write.
    pub async fn settle(&self, kind: WriteKind) {
        let delay = match kind {
            WriteKind::Update => self.settle.after_write,
            WriteKind::Create => self.settle.after_create,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    // ---- tasks ----

    /// Tasks in `category`; `None` or `"all"` lists everything.
    pub async fn list_tasks(&self, category: Option<&str>) -> Result<Vec<Task>, BoardError> {
        let category = category.filter(|c| *c != "all" && !c.is_empty());
        self.gateway
            .list_tasks(category)
            .await
            .map_err(|e| BoardError::from_gateway("load tasks", Access::Read, e))
    }

    pub async fn get_task(&self, id: u64) -> Result<Task, BoardError> {
        self.gateway.get_task(id).await.map_err(|e| BoardError::from_gateway("load task", Access::Read, e))
    }

    pub async fn stats(&self, category: Option<&str>, today: NaiveDate) -> Result<TaskStats, BoardError> {
        let tasks = self.list_tasks(category).await?;
        Ok(TaskStats::collect(&tasks, today))
    }

    /// Create a task. Title, assignee and final date are checked before any call.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, BoardError> {
        draft.validate()?;
        let task = self
            .gateway
            .create_task(&draft)
            .await
            .map_err(|e| BoardError::from_gateway("create task", Access::Write, e))?;
        tracing::info!(task = task.id, title = %task.title, "task created");
        Ok(task)
    }

    /// Ask the analyzer for a cleaned description.
    pub async fn describe_with_ai(&self, raw: &str) -> Result<String, AnalysisError> {
        let result = self.analyzer.analyze(raw).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "text analysis failed");
        }
        result
    }

    /// Overwrite the stored status. Any status may follow any other.
    pub async fn update_status(&self, id: u64, status: Status) -> Result<(), BoardError> {
        self.gateway
            .patch_task_status(id, status)
            .await
            .map_err(|e| BoardError::from_gateway("update status", Access::Write, e))?;
        tracing::info!(task = id, %status, "status updated");
        Ok(())
    }

    /// Save the assignee's response. A pending task moves to in progress with
    /// the first response. Returns the stored status afterwards.
    pub async fn update_response(&self, id: u64, text: &str) -> Result<Status, BoardError> {
        let task = self.get_task(id).await?;
        self.gateway
            .patch_task_response(id, text)
            .await
            .map_err(|e| BoardError::from_gateway("save response", Access::Write, e))?;
        if task.status != Status::Pending {
            tracing::info!(task = id, "response saved");
            return Ok(task.status);
        }
        self.gateway
            .patch_task_status(id, Status::InProgress)
            .await
            .map_err(|e| BoardError::from_gateway("start task after response", Access::Write, e))?;
        tracing::info!(task = id, "response saved; task moved to in progress");
        Ok(Status::InProgress)
    }

    // ---- evidence ----

    /// Build an evidence item from user input and append it to the task.
    pub async fn add_evidence(&self, task_id: u64, draft: EvidenceDraft) -> Result<Evidence, BoardError> {
        draft.validate()?;
        let task = self.read_for_evidence(task_id).await?;
        let item = draft.into_evidence(evidence::new_evidence_id(&task.evidence));
        self.write_evidence(&task, evidence::add_evidence(&task.evidence, item.clone())?, "add evidence")
            .await?;
        Ok(item)
    }

    /// Append a fully formed item. Its id must be unused on the task.
    pub async fn add_evidence_item(&self, task_id: u64, item: Evidence) -> Result<Vec<Evidence>, BoardError> {
        let task = self.read_for_evidence(task_id).await?;
        let next = evidence::add_evidence(&task.evidence, item)?;
        self.write_evidence(&task, next, "add evidence").await
    }

    /// Remove an item. Unknown ids change nothing and skip the write.
    pub async fn remove_evidence(&self, task_id: u64, evidence_id: &str) -> Result<Vec<Evidence>, BoardError> {
        let task = self.read_for_evidence(task_id).await?;
        let next = evidence::remove_evidence(&task.evidence, evidence_id);
        if next.len() == task.evidence.len() {
            tracing::debug!(task = task_id, evidence = evidence_id, "no such evidence; nothing to remove");
            return Ok(next);
        }
        self.write_evidence(&task, next, "remove evidence").await
    }

    async fn read_for_evidence(&self, task_id: u64) -> Result<Task, BoardError> {
        self.gateway
            .get_task(task_id)
            .await
            .map_err(|e| BoardError::from_gateway("read task evidence", Access::Read, e))
    }

    async fn write_evidence(
        &self,
        task: &Task,
        next: Vec<Evidence>,
        operation: &'static str,
    ) -> Result<Vec<Evidence>, BoardError> {
        tracing::debug!(task = task.id, before = task.evidence.len(), after = next.len(), "replacing evidence array");
        self.gateway
            .patch_task_evidence(task.id, &next)
            .await
            .map_err(|e| BoardError::from_gateway(operation, Access::Write, e))?;
        tracing::info!(task = task.id, count = next.len(), "{operation} done");
        Ok(next)
    }

    // ---- users ----

    pub async fn list_users(&self) -> Result<Vec<User>, BoardError> {
        self.gateway.list_users().await.map_err(|e| BoardError::from_gateway("load users", Access::Read, e))
    }

    /// Users for display, falling back to the sample roster when the backend
    /// list is unavailable or empty.
    pub async fn roster(&self) -> Roster {
        match self.list_users().await {
            Ok(users) if !users.is_empty() => Roster { users, source: RosterSource::Backend },
            Ok(_) => {
                tracing::warn!("no users stored; showing the sample roster");
                Roster {
                    users: sample_roster(),
                    source: RosterSource::Fallback { reason: "no users stored".into() },
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not load users; showing the sample roster");
                Roster { users: sample_roster(), source: RosterSource::Fallback { reason: e.user_message() } }
            }
        }
    }

    /// Create a user. Without an explicit level the role's default level applies.
    pub async fn create_user(&self, mut draft: UserDraft) -> Result<User, BoardError> {
        draft.validate()?;
        if draft.level.is_none() {
            draft.level = Some(self.local_role_set(&[]).default_level(draft.role.trim()));
        }
        let user = self
            .gateway
            .create_user(&draft)
            .await
            .map_err(|e| BoardError::from_gateway("create user", Access::Write, e))?;
        tracing::info!(user = user.id, role = %user.role, "user created");
        Ok(user)
    }

    pub async fn update_user(&self, mut user: User) -> Result<User, BoardError> {
        user.role = user.role_id().to_string();
        if user.name.trim().is_empty() {
            return Err(BoardError::validation("name", "a user needs a name"));
        }
        if user.role.trim().is_empty() {
            return Err(BoardError::validation("role", "a user needs a role"));
        }
        let user = self
            .gateway
            .update_user(&user)
            .await
            .map_err(|e| BoardError::from_gateway("update user", Access::Write, e))?;
        tracing::info!(user = user.id, "user updated");
        Ok(user)
    }

    /// Delete a user nobody's task refers to.
    pub async fn delete_user(&self, id: u64) -> Result<(), BoardError> {
        let tasks = self.list_tasks(None).await?;
        check_user_deletable(id, &tasks)?;
        self.gateway
            .delete_user(id)
            .await
            .map_err(|e| BoardError::from_gateway("delete user", Access::Write, e))?;
        tracing::info!(user = id, "user deleted");
        Ok(())
    }

    // ---- roles ----

    pub fn custom_roles(&self) -> &[RoleRecord] {
        self.roles.roles()
    }

    /// Built-in and cached roles plus placeholders for `observed` identifiers.
    pub fn local_role_set(&self, observed: &[String]) -> RoleSet {
        RoleSet::merge(builtin_roles(), self.roles.roles().iter().cloned(), observed.iter().map(String::as_str))
    }

    /// Role set including every identifier the backend's users reference.
    pub async fn role_set(&self) -> Result<RoleSet, BoardError> {
        let observed = self
            .gateway
            .list_role_identifiers()
            .await
            .map_err(|e| BoardError::from_gateway("load role identifiers", Access::Read, e))?;
        Ok(self.local_role_set(&observed))
    }

    pub async fn create_role(&mut self, draft: RoleDraft) -> Result<RoleRecord, BoardError> {
        draft.validate()?;
        let record = draft.into_record();
        if self.local_role_set(&[]).get(&record.id).is_some() {
            return Err(BoardError::conflict(format!("role {} already exists", record.id)));
        }
        let mut roles = self.roles.roles().to_vec();
        roles.push(record.clone());
        self.roles.save(roles)?;
        tracing::info!(role = %record.id, "role created");
        Ok(record)
    }

    /// Edit a custom role. The id is the lookup key and never changes.
    pub async fn edit_role(&mut self, draft: RoleDraft) -> Result<RoleRecord, BoardError> {
        draft.validate()?;
        let id = draft.id.trim().to_string();
        if is_builtin(&id) {
            return Err(BoardError::conflict(format!("role {id} is built in and cannot be edited")));
        }
        let mut roles = self.roles.roles().to_vec();
        let slot = roles.iter_mut().find(|r| r.id == id).ok_or_else(|| BoardError::not_found("role", &id))?;
        draft.apply_to(slot);
        let updated = slot.clone();
        self.roles.save(roles)?;
        tracing::info!(role = %id, "role updated");
        Ok(updated)
    }

    /// Delete a custom role that no user holds. Both checks run before any change.
    pub async fn delete_role(&mut self, id: &str) -> Result<(), BoardError> {
        let users = self.list_users().await?;
        let set = self.local_role_set(&[]);
        check_role_deletable(id, &set, &users)?;
        let mut roles = self.roles.roles().to_vec();
        let before = roles.len();
        roles.retain(|r| r.id != id);
        if roles.len() == before {
            return Err(BoardError::not_found("role", id));
        }
        self.roles.save(roles)?;
        tracing::info!(role = id, "role deleted");
        Ok(())
    }

    /// Copy roles from the backend role store into the local cache.
    /// Built-ins and already cached ids are left alone.
    pub async fn sync_roles(&mut self) -> Result<SyncReport, BoardError> {
        let remote = self
            .gateway
            .list_roles()
            .await
            .map_err(|e| BoardError::from_gateway("load roles", Access::Read, e))?;
        let mut roles = self.roles.roles().to_vec();
        let mut report = SyncReport::default();
        for mut record in remote {
            if is_builtin(&record.id) || roles.iter().any(|r| r.id == record.id) {
                report.skipped.push(record.id);
                continue;
            }
            record.is_default = false;
            report.added.push(record.id.clone());
            roles.push(record);
        }
        if !report.added.is_empty() {
            self.roles.save(roles)?;
        }
        tracing::info!(added = report.added.len(), skipped = report.skipped.len(), "roles synced");
        Ok(report)
    }
}
