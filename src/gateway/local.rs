//! JSON file backend.
//!
//! The whole database is held in memory and written back atomically (temp
//! file + rename) after every mutation. Without a path it never touches disk.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{GatewayError, GatewayResult, PersistenceGateway};
use crate::fields::{Level, Status};
use crate::role::RoleRecord;
use crate::task::{Evidence, Task, TaskDraft};
use crate::user::{User, UserDraft};

/// On-disk layout of the local board.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub roles: Vec<RoleRecord>,
}

impl Database {
    /// Load from `path`; a missing file is an empty database.
    pub fn load(path: &Path) -> GatewayResult<Self> {
        if !path.exists() {
            return Ok(Database::default());
        }
        let buf = fs::read_to_string(path)?;
        if buf.trim().is_empty() {
            return Ok(Database::default());
        }
        Ok(serde_json::from_str(&buf)?)
    }

    pub fn save(&self, path: &Path) -> GatewayResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self)?;
        let mut f = File::create(&tmp)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    pub fn next_task_id(&self) -> u64 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    pub fn next_user_id(&self) -> u64 {
        self.users.iter().map(|u| u.id).max().unwrap_or(0) + 1
    }

    fn task_mut(&mut self, id: u64) -> GatewayResult<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id).ok_or_else(|| not_found("task", id))
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> GatewayError {
    GatewayError::NotFound { entity, id: id.to_string() }
}

pub struct LocalGateway {
    path: Option<PathBuf>,
    db: Mutex<Database>,
}

impl LocalGateway {
    /// Open the database file at `path`, creating it on first write.
    pub fn open(path: impl Into<PathBuf>) -> GatewayResult<Self> {
        let path = path.into();
        let db = Database::load(&path)?;
        tracing::debug!(path = %path.display(), tasks = db.tasks.len(), users = db.users.len(), "opened local board");
        Ok(LocalGateway { path: Some(path), db: Mutex::new(db) })
    }

    pub fn in_memory() -> Self {
        LocalGateway::with_data(Database::default())
    }

    /// In-memory gateway seeded with `db`.
    pub fn with_data(db: Database) -> Self {
        LocalGateway { path: None, db: Mutex::new(db) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn read<T>(&self, f: impl FnOnce(&Database) -> T + Send) -> T {
        let db = self.db.lock().await;
        f(&db)
    }

    /// Apply `f` to a copy of the database and commit it only if it succeeds
    /// and, for file-backed boards, the save succeeds too.
    async fn write<T>(&self, f: impl FnOnce(&mut Database) -> GatewayResult<T> + Send) -> GatewayResult<T> {
        let mut db = self.db.lock().await;
        let mut staged = db.clone();
        let out = f(&mut staged)?;
        if let Some(path) = &self.path {
            staged.save(path)?;
        }
        *db = staged;
        Ok(out)
    }
}

#[async_trait]
impl PersistenceGateway for LocalGateway {
    fn describe(&self) -> String {
        match &self.path {
            Some(p) => format!("local file {}", p.display()),
            None => "in-memory board".into(),
        }
    }

    async fn list_tasks(&self, role_category: Option<&str>) -> GatewayResult<Vec<Task>> {
        Ok(self
            .read(|db| {
                db.tasks
                    .iter()
                    .filter(|t| role_category.map_or(true, |c| t.role_category == c))
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn get_task(&self, id: u64) -> GatewayResult<Task> {
        self.read(|db| db.tasks.iter().find(|t| t.id == id).cloned()).await.ok_or_else(|| not_found("task", id))
    }

    async fn create_task(&self, draft: &TaskDraft) -> GatewayResult<Task> {
        self.write(|db| {
            let task = Task::from_draft(db.next_task_id(), draft.clone());
            db.tasks.push(task.clone());
            Ok(task)
        })
        .await
    }

    async fn insert_task(&self, task: &Task) -> GatewayResult<Task> {
        self.write(|db| {
            if db.tasks.iter().any(|t| t.id == task.id) {
                return Err(GatewayError::Conflict(format!("task {} already exists", task.id)));
            }
            db.tasks.push(task.clone());
            Ok(task.clone())
        })
        .await
    }

    async fn replace_task(&self, task: &Task) -> GatewayResult<Task> {
        self.write(|db| {
            let slot = db.task_mut(task.id)?;
            *slot = task.clone();
            Ok(task.clone())
        })
        .await
    }

    async fn patch_task_status(&self, id: u64, status: Status) -> GatewayResult<()> {
        self.write(|db| {
            db.task_mut(id)?.status = status;
            Ok(())
        })
        .await
    }

    async fn patch_task_response(&self, id: u64, text: &str) -> GatewayResult<()> {
        self.write(|db| {
            db.task_mut(id)?.assignee_response = Some(text.to_string());
            Ok(())
        })
        .await
    }

    async fn patch_task_evidence(&self, id: u64, evidence: &[Evidence]) -> GatewayResult<()> {
        self.write(|db| {
            db.task_mut(id)?.evidence = evidence.to_vec();
            Ok(())
        })
        .await
    }

    async fn list_users(&self) -> GatewayResult<Vec<User>> {
        Ok(self.read(|db| db.users.clone()).await)
    }

    async fn create_user(&self, draft: &UserDraft) -> GatewayResult<User> {
        self.write(|db| {
            let user = User::from_draft(db.next_user_id(), draft.clone(), Level::STAFF);
            db.users.push(user.clone());
            Ok(user)
        })
        .await
    }

    async fn insert_user(&self, user: &User) -> GatewayResult<User> {
        self.write(|db| {
            if db.users.iter().any(|u| u.id == user.id) {
                return Err(GatewayError::Conflict(format!("user {} already exists", user.id)));
            }
            db.users.push(user.clone());
            Ok(user.clone())
        })
        .await
    }

    async fn update_user(&self, user: &User) -> GatewayResult<User> {
        self.write(|db| {
            let slot = db.users.iter_mut().find(|u| u.id == user.id).ok_or_else(|| not_found("user", user.id))?;
            *slot = user.clone();
            Ok(user.clone())
        })
        .await
    }

    async fn delete_user(&self, id: u64) -> GatewayResult<()> {
        self.write(|db| {
            let before = db.users.len();
            db.users.retain(|u| u.id != id);
            if db.users.len() == before {
                return Err(not_found("user", id));
            }
            Ok(())
        })
        .await
    }

    async fn list_role_identifiers(&self) -> GatewayResult<Vec<String>> {
        Ok(self
            .read(|db| {
                let ids: BTreeSet<String> = db.users.iter().map(|u| u.role_id().to_string()).filter(|r| !r.is_empty()).collect();
                ids.into_iter().collect()
            })
            .await)
    }

    async fn list_roles(&self) -> GatewayResult<Vec<RoleRecord>> {
        Ok(self.read(|db| db.roles.clone()).await)
    }

    async fn save_role(&self, role: &RoleRecord) -> GatewayResult<RoleRecord> {
        self.write(|db| {
            if db.roles.iter().any(|r| r.id == role.id) {
                return Err(GatewayError::Conflict(format!("role {} already exists", role.id)));
            }
            db.roles.push(role.clone());
            Ok(role.clone())
        })
        .await
    }

    async fn update_role(&self, role: &RoleRecord) -> GatewayResult<RoleRecord> {
        self.write(|db| {
            let slot = db.roles.iter_mut().find(|r| r.id == role.id).ok_or_else(|| not_found("role", &role.id))?;
            *slot = role.clone();
            Ok(role.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskDates;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    fn draft(title: &str, category: &str) -> TaskDraft {
        TaskDraft {
            title: title.into(),
            assignee_id: Some(2),
            role_category: category.into(),
            dates: TaskDates { final_date: NaiveDate::from_ymd_opt(2025, 9, 30), ..TaskDates::default() },
            ..TaskDraft::default()
        }
    }

    #[tokio::test]
    async fn ids_are_sequential_and_filter_works() {
        let gw = LocalGateway::in_memory();
        let a = gw.create_task(&draft("Linen audit", "ward_ops")).await.unwrap();
        let b = gw.create_task(&draft("Pressure ulcer review", "nurse")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(gw.list_tasks(Some("nurse")).await.unwrap().len(), 1);
        assert_eq!(gw.list_tasks(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn patches_on_missing_tasks_are_not_found() {
        let gw = LocalGateway::in_memory();
        assert_matches!(
            gw.patch_task_status(9, Status::Done).await,
            Err(GatewayError::NotFound { entity: "task", .. })
        );
        assert_matches!(gw.get_task(9).await, Err(GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("board.json");
        {
            let gw = LocalGateway::open(&path).unwrap();
            let task = gw.create_task(&draft("Infection control rounds", "nurse")).await.unwrap();
            gw.patch_task_response(task.id, "Started on ward 7").await.unwrap();
            gw.save_role(&RoleRecord {
                id: "porter".into(),
                name: "Porter".into(),
                icon: Default::default(),
                color: String::new(),
                level: Level::STAFF,
                is_default: false,
                webhook: None,
            })
            .await
            .unwrap();
        }
        let gw = LocalGateway::open(&path).unwrap();
        let task = gw.get_task(1).await.unwrap();
        assert_eq!(task.assignee_response.as_deref(), Some("Started on ward 7"));
        assert_eq!(gw.list_roles().await.unwrap().len(), 1);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn duplicate_inserts_conflict() {
        let gw = LocalGateway::in_memory();
        let task = gw.create_task(&draft("Audit", "nurse")).await.unwrap();
        assert_matches!(gw.insert_task(&task).await, Err(GatewayError::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_writes_leave_memory_untouched() {
        let gw = LocalGateway::in_memory();
        let result = gw.delete_user(3).await;
        assert_matches!(result, Err(GatewayError::NotFound { entity: "user", .. }));
        assert!(gw.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn role_identifiers_are_distinct() {
        let gw = LocalGateway::in_memory();
        for (name, role) in [("Lin", "nurse"), ("Kao", "nurse"), ("Wu", "porter")] {
            gw.create_user(&UserDraft { name: name.into(), role: role.into(), ..UserDraft::default() })
                .await
                .unwrap();
        }
        assert_eq!(gw.list_role_identifiers().await.unwrap(), vec!["nurse", "porter"]);
    }
}
