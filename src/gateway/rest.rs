//! HTTP backend speaking PostgREST conventions (as exposed by Supabase).
//!
//! Tables `tasks`, `users` and `roles` live under `<url>/rest/v1`. Rows are
//! flat snake_case records; filters use `?col=eq.<value>`; partial updates are
//! `PATCH`. Every write asks for `return=representation`, so an empty result
//! set on a filtered write means the id did not match anything.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{timestamp_id, GatewayError, GatewayResult, PersistenceGateway};
use crate::dates::parse_stored_date;
use crate::fields::{IconKind, Level, Status};
use crate::role::RoleRecord;
use crate::task::{Evidence, Task, TaskDates, TaskDraft};
use crate::user::{User, UserDraft};

pub struct RestGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestGateway {
    /// Build a client for the backend at `url` (with or without `/rest/v1`).
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> GatewayResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, url, api_key))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, url: &str, api_key: &str) -> Self {
        RestGateway { client, base_url: rest_base(url), api_key: api_key.to_string() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        tracing::debug!(%method, table, "backend request");
        self.client
            .request(method, format!("{}/{}", self.base_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, req: RequestBuilder) -> GatewayResult<Vec<T>> {
        let response = req.send().await.map_err(transport)?;
        let response = ensure_success(response).await?;
        let body = response.text().await.map_err(transport)?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// First row of a filtered call; no rows means the id did not match.
    async fn single_row<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        entity: &'static str,
        id: impl ToString,
    ) -> GatewayResult<T> {
        self.fetch_rows(req)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound { entity, id: id.to_string() })
    }

    async fn patch_task(&self, id: u64, body: Value) -> GatewayResult<()> {
        let req = self.request(Method::PATCH, "tasks").query(&[("id", eq(id))]).json(&body);
        self.single_row::<TaskRow>(req, "task", id).await.map(|_| ())
    }
}

fn rest_base(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.ends_with("/rest/v1") {
        url.to_string()
    } else {
        format!("{url}/rest/v1")
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

fn transport(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Request(e)
    }
}

/// Map non-2xx replies onto gateway errors. Duplicate keys come back as 409.
async fn ensure_success(response: reqwest::Response) -> GatewayResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
    if status == StatusCode::CONFLICT {
        return Err(GatewayError::Conflict(body));
    }
    Err(GatewayError::Status { status: status.as_u16(), body })
}

#[async_trait]
impl PersistenceGateway for RestGateway {
    fn describe(&self) -> String {
        format!("REST backend {}", self.base_url)
    }

    async fn list_tasks(&self, role_category: Option<&str>) -> GatewayResult<Vec<Task>> {
        let mut req = self.request(Method::GET, "tasks").query(&[("select", "*"), ("order", "id.desc")]);
        if let Some(category) = role_category {
            req = req.query(&[("role_category", eq(category))]);
        }
        let rows: Vec<TaskRow> = self.fetch_rows(req).await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn get_task(&self, id: u64) -> GatewayResult<Task> {
        let req = self.request(Method::GET, "tasks").query(&[("id", eq(id))]);
        self.single_row::<TaskRow>(req, "task", id).await?.into_task()
    }

    async fn create_task(&self, draft: &TaskDraft) -> GatewayResult<Task> {
        let task = Task::from_draft(timestamp_id(), draft.clone());
        self.insert_task(&task).await
    }

    async fn insert_task(&self, task: &Task) -> GatewayResult<Task> {
        let req = self.request(Method::POST, "tasks").json(&TaskRow::from(task));
        let rows: Vec<TaskRow> = self.fetch_rows(req).await?;
        match rows.into_iter().next() {
            Some(row) => row.into_task(),
            None => Ok(task.clone()),
        }
    }

    async fn replace_task(&self, task: &Task) -> GatewayResult<Task> {
        let req = self.request(Method::PATCH, "tasks").query(&[("id", eq(task.id))]).json(&TaskRow::from(task));
        self.single_row::<TaskRow>(req, "task", task.id).await?.into_task()
    }

    async fn patch_task_status(&self, id: u64, status: Status) -> GatewayResult<()> {
        self.patch_task(id, json!({ "status": status.as_str() })).await
    }

    async fn patch_task_response(&self, id: u64, text: &str) -> GatewayResult<()> {
        self.patch_task(id, json!({ "assignee_response": text })).await
    }

    async fn patch_task_evidence(&self, id: u64, evidence: &[Evidence]) -> GatewayResult<()> {
        self.patch_task(id, json!({ "evidence": evidence })).await
    }

    async fn list_users(&self) -> GatewayResult<Vec<User>> {
        let req = self.request(Method::GET, "users").query(&[("select", "*"), ("order", "id.asc")]);
        let rows: Vec<UserRow> = self.fetch_rows(req).await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn create_user(&self, draft: &UserDraft) -> GatewayResult<User> {
        let user = User::from_draft(timestamp_id(), draft.clone(), Level::STAFF);
        self.insert_user(&user).await
    }

    async fn insert_user(&self, user: &User) -> GatewayResult<User> {
        let req = self.request(Method::POST, "users").json(&UserRow::from(user));
        let rows: Vec<UserRow> = self.fetch_rows(req).await?;
        Ok(rows.into_iter().next().map(User::from).unwrap_or_else(|| user.clone()))
    }

    async fn update_user(&self, user: &User) -> GatewayResult<User> {
        let req = self.request(Method::PATCH, "users").query(&[("id", eq(user.id))]).json(&UserRow::from(user));
        Ok(self.single_row::<UserRow>(req, "user", user.id).await?.into())
    }

    async fn delete_user(&self, id: u64) -> GatewayResult<()> {
        let req = self.request(Method::DELETE, "users").query(&[("id", eq(id))]);
        self.single_row::<Value>(req, "user", id).await.map(|_| ())
    }

    async fn list_role_identifiers(&self) -> GatewayResult<Vec<String>> {
        let req = self.request(Method::GET, "users").query(&[("select", "role")]);
        let rows: Vec<RoleOnly> = self.fetch_rows(req).await?;
        let mut seen = HashSet::new();
        Ok(rows
            .into_iter()
            .filter_map(|r| r.role)
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty() && seen.insert(r.clone()))
            .collect())
    }

    async fn list_roles(&self) -> GatewayResult<Vec<RoleRecord>> {
        let req = self.request(Method::GET, "roles").query(&[("select", "*")]);
        let rows: Vec<RoleRow> = self.fetch_rows(req).await?;
        Ok(rows.into_iter().map(RoleRecord::from).collect())
    }

    async fn save_role(&self, role: &RoleRecord) -> GatewayResult<RoleRecord> {
        let req = self.request(Method::POST, "roles").json(&RoleRow::from(role));
        let rows: Vec<RoleRow> = self.fetch_rows(req).await?;
        Ok(rows.into_iter().next().map(RoleRecord::from).unwrap_or_else(|| role.clone()))
    }

    async fn update_role(&self, role: &RoleRecord) -> GatewayResult<RoleRecord> {
        let req = self.request(Method::PATCH, "roles").query(&[("id", eq(&role.id))]).json(&RoleRow::from(role));
        Ok(self.single_row::<RoleRow>(req, "role", &role.id).await?.into())
    }
}

/// `tasks` table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assigner_id: Option<u64>,
    #[serde(default)]
    pub assignee_id: Option<u64>,
    #[serde(default)]
    pub collaborator_ids: Value,
    #[serde(default)]
    pub role_category: Option<String>,
    #[serde(default)]
    pub plan_date: Option<String>,
    #[serde(default)]
    pub interim_date: Option<String>,
    #[serde(default)]
    pub final_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assignee_response: Option<String>,
    #[serde(default)]
    pub evidence: Value,
}

impl TaskRow {
    pub fn into_task(self) -> GatewayResult<Task> {
        let evidence: Vec<Evidence> = match self.evidence {
            Value::Null => Vec::new(),
            // Some exports store the array as a JSON string.
            Value::String(s) if s.trim().is_empty() => Vec::new(),
            Value::String(s) => serde_json::from_str(&s)?,
            other => serde_json::from_value(other)?,
        };
        Ok(Task {
            id: self.id,
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            assigner_id: self.assigner_id,
            assignee_id: self.assignee_id,
            collaborator_ids: parse_id_list(&self.collaborator_ids),
            role_category: self.role_category.unwrap_or_default(),
            dates: TaskDates {
                plan: self.plan_date.as_deref().and_then(parse_stored_date),
                interim: self.interim_date.as_deref().and_then(parse_stored_date),
                final_date: self.final_date.as_deref().and_then(parse_stored_date),
            },
            status: self.status.as_deref().map(Status::parse_lenient).unwrap_or_default(),
            assignee_response: self.assignee_response.filter(|s| !s.is_empty()),
            evidence,
        })
    }
}

impl From<&Task> for TaskRow {
    fn from(t: &Task) -> Self {
        let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string());
        TaskRow {
            id: t.id,
            title: Some(t.title.clone()),
            description: Some(t.description.clone()).filter(|s| !s.is_empty()),
            assigner_id: t.assigner_id,
            assignee_id: t.assignee_id,
            collaborator_ids: json!(t.collaborator_ids),
            role_category: Some(t.role_category.clone()).filter(|s| !s.is_empty()),
            plan_date: date(t.dates.plan),
            interim_date: date(t.dates.interim),
            final_date: date(t.dates.final_date),
            status: Some(t.status.as_str().to_string()),
            assignee_response: t.assignee_response.clone(),
            evidence: json!(t.evidence),
        }
    }
}

/// Read user ids from a JSON array, a JSON string or a comma separated list.
pub fn parse_id_list(value: &Value) -> BTreeSet<u64> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect(),
        Value::Number(n) => n.as_u64().into_iter().collect(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Array(_)) => parse_id_list(&parsed),
            _ => s.split(',').filter_map(|p| p.trim().parse().ok()).collect(),
        },
        _ => BTreeSet::new(),
    }
}

/// `users` table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub employee_id: Option<Value>,
    #[serde(default)]
    pub headshot: Option<String>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        let employee_id = match r.employee_id {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        User {
            id: r.id,
            name: r.name.unwrap_or_default(),
            role: r.role.map(|s| s.trim().to_string()).unwrap_or_default(),
            level: r.level,
            mail: r.mail.filter(|s| !s.trim().is_empty()),
            employee_id,
            avatar: r.headshot.filter(|s| !s.trim().is_empty()),
        }
    }
}

impl From<&User> for UserRow {
    fn from(u: &User) -> Self {
        UserRow {
            id: u.id,
            name: Some(u.name.clone()),
            role: Some(u.role.clone()).filter(|s| !s.is_empty()),
            level: u.level,
            mail: u.mail.clone(),
            employee_id: u.employee_id.clone().map(Value::String),
            headshot: u.avatar.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoleOnly {
    #[serde(default)]
    role: Option<String>,
}

/// `roles` table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRow {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon_name: IconKind,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub is_default: Option<bool>,
}

impl From<RoleRow> for RoleRecord {
    fn from(r: RoleRow) -> Self {
        RoleRecord {
            name: r.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| r.id.clone()),
            id: r.id,
            icon: r.icon_name,
            color: r.color.unwrap_or_default(),
            level: r.level,
            is_default: r.is_default.unwrap_or(false),
            webhook: r.webhook.filter(|w| !w.trim().is_empty()),
        }
    }
}

impl From<&RoleRecord> for RoleRow {
    fn from(r: &RoleRecord) -> Self {
        RoleRow {
            id: r.id.clone(),
            name: Some(r.name.clone()),
            icon_name: r.icon,
            color: Some(r.color.clone()),
            level: r.level,
            webhook: r.webhook.clone(),
            is_default: Some(r.is_default),
        }
    }
}
