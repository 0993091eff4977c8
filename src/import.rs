//! Bulk import of roles, users and tasks from CSV exports.
//!
//! Tables are imported in dependency order: roles, then users (creating
//! placeholder roles for any role a user references that does not exist yet),
//! then tasks. Rows that cannot be converted are skipped; inserts that hit an
//! existing id fall back to an update.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use serde::Serialize;
use serde_json::Value;

use crate::dates::parse_flexible_date;
use crate::fields::{IconKind, Level, Status};
use crate::gateway::rest::parse_id_list;
use crate::gateway::{timestamp_id, GatewayError, PersistenceGateway};
use crate::role::{placeholder_record, RoleRecord, DEFAULT_COLOR};
use crate::task::{Evidence, Task, TaskDates};
use crate::user::User;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("could not list existing roles: {0}")]
    Roles(#[source] GatewayError),
}

/// One CSV data row keyed by trimmed header name.
#[derive(Debug, Clone, Default)]
pub struct Row {
    /// 1-based line number in the file (the header is line 1).
    pub line: usize,
    fields: HashMap<String, String>,
}

impl Row {
    /// Trimmed value of the first non-empty column among `names`.
    pub fn get(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|n| self.fields.get(*n))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub roles: TableSummary,
    pub users: TableSummary,
    pub tasks: TableSummary,
    /// Placeholder roles created for users that referenced unknown roles.
    pub created_roles: Vec<String>,
}

/// Files to import. Any of them may be absent.
#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    pub roles: Option<PathBuf>,
    pub users: Option<PathBuf>,
    pub tasks: Option<PathBuf>,
}

/// Pick the delimiter that occurs most often in the header line.
pub fn sniff_delimiter(sample: &str) -> u8 {
    let header = sample.lines().next().unwrap_or("");
    [b',', b';', b'\t']
        .into_iter()
        .map(|d| (d, header.bytes().filter(|b| *b == d).count()))
        .filter(|(_, n)| *n > 0)
        .max_by_key(|(_, n)| *n)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

pub fn parse_rows(content: &str) -> Result<Vec<Row>, csv::Error> {
    let content = content.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(sniff_delimiter(content))
        .from_reader(content.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record: StringRecord = record?;
        let fields = headers.iter().cloned().zip(record.iter().map(String::from)).collect();
        rows.push(Row { line: idx + 2, fields });
    }
    Ok(rows)
}

pub fn read_rows(path: &Path) -> Result<Vec<Row>, ImportError> {
    let content = fs::read_to_string(path).map_err(|source| ImportError::Io { path: path.to_path_buf(), source })?;
    parse_rows(&content).map_err(|source| ImportError::Csv { path: path.to_path_buf(), source })
}

/// `true`, `1`, `yes`, `y` and `t` (any case) are true; everything else is false.
pub fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "y" | "t")
}

fn parse_level(row: &Row) -> Level {
    Level::from_optional(row.get(&["level"]).and_then(|s| s.parse::<i64>().ok()))
}

/// Id column if numeric, otherwise a timestamp id offset by the line number.
fn row_id(row: &Row) -> u64 {
    row.get(&["id"])
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or_else(|| timestamp_id() + row.line as u64)
}

pub fn role_from_row(row: &Row) -> Result<RoleRecord, String> {
    let id = row.get(&["id"]).ok_or("missing id")?.to_string();
    Ok(RoleRecord {
        name: row.get(&["name"]).unwrap_or(id.as_str()).to_string(),
        icon: IconKind::from_name(row.get(&["icon_name", "iconName"]).unwrap_or("Briefcase")),
        color: row.get(&["color"]).unwrap_or(DEFAULT_COLOR).to_string(),
        level: parse_level(row),
        is_default: row.get(&["is_default"]).is_some_and(parse_bool),
        webhook: row.get(&["webhook"]).map(String::from),
        id,
    })
}

pub fn user_from_row(row: &Row) -> Result<User, String> {
    let name = row.get(&["name"]).ok_or("missing name")?.to_string();
    Ok(User {
        id: row_id(row),
        name,
        role: row.get(&["role"]).unwrap_or_default().to_string(),
        level: parse_level(row),
        mail: row.get(&["Mail", "mail"]).map(String::from),
        employee_id: row.get(&["ID4", "id4", "employee_id"]).map(String::from),
        avatar: row.get(&["headshot", "avatar"]).map(String::from),
    })
}

pub fn task_from_row(row: &Row) -> Result<Task, String> {
    let optional_id = |col: &str| -> Result<Option<u64>, String> {
        match row.get(&[col]) {
            None => Ok(None),
            Some(s) => s.parse().map(Some).map_err(|_| format!("{col} is not a number: {s}")),
        }
    };
    let evidence: Vec<Evidence> = match row.get(&["evidence"]) {
        None => Vec::new(),
        Some(raw) => serde_json::from_str(raw).map_err(|e| format!("evidence is not valid JSON: {e}"))?,
    };
    let collaborators: BTreeSet<u64> = row
        .get(&["collaborator_ids"])
        .map(|raw| parse_id_list(&Value::String(raw.to_string())))
        .unwrap_or_default();
    let date = |col: &str| row.get(&[col]).and_then(parse_flexible_date);

    Ok(Task {
        id: row_id(row),
        title: row.get(&["title"]).map(String::from).unwrap_or_else(|| format!("Task {}", row.line)),
        description: row.get(&["description"]).unwrap_or_default().to_string(),
        assigner_id: optional_id("assigner_id")?,
        assignee_id: optional_id("assignee_id")?,
        collaborator_ids: collaborators,
        role_category: row.get(&["role_category"]).unwrap_or_default().to_string(),
        dates: TaskDates { plan: date("plan_date"), interim: date("interim_date"), final_date: date("final_date") },
        status: row.get(&["status"]).map(Status::parse_lenient).unwrap_or_default(),
        assignee_response: row.get(&["assignee_response"]).map(String::from),
        evidence,
    })
}

/// Convert every row, counting the ones that fail.
fn convert<T>(rows: &[Row], table: &str, f: impl Fn(&Row) -> Result<T, String>, summary: &mut TableSummary) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match f(row) {
            Ok(item) => Some(item),
            Err(reason) => {
                tracing::warn!(table, line = row.line, %reason, "skipping row");
                summary.skipped += 1;
                None
            }
        })
        .collect()
}

/// Run the import against `gateway`.
pub async fn run_import(gateway: &dyn PersistenceGateway, plan: &ImportPlan) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();

    if let Some(path) = &plan.roles {
        let rows = read_rows(path)?;
        tracing::info!(rows = rows.len(), path = %path.display(), "importing roles");
        for role in convert(&rows, "roles", role_from_row, &mut summary.roles) {
            let key = role.id.clone();
            match gateway.save_role(&role).await {
                Ok(_) => summary.roles.imported += 1,
                Err(GatewayError::Conflict(_)) => record_update(&mut summary.roles, "roles", &key, gateway.update_role(&role).await),
                Err(e) => record_failure(&mut summary.roles, "roles", &key, &e),
            }
        }
    }

    if let Some(path) = &plan.users {
        let rows = read_rows(path)?;
        tracing::info!(rows = rows.len(), path = %path.display(), "importing users");
        let users = convert(&rows, "users", user_from_row, &mut summary.users);

        let existing: BTreeSet<String> =
            gateway.list_roles().await.map_err(ImportError::Roles)?.into_iter().map(|r| r.id).collect();
        let missing: BTreeSet<&str> = users
            .iter()
            .map(User::role_id)
            .filter(|r| !r.is_empty() && !existing.contains(*r))
            .collect();
        for role in missing {
            match gateway.save_role(&placeholder_record(role)).await {
                Ok(_) | Err(GatewayError::Conflict(_)) => summary.created_roles.push(role.to_string()),
                Err(e) => tracing::warn!(role, error = %e, "could not create placeholder role"),
            }
        }

        for user in users {
            let key = user.id.to_string();
            match gateway.insert_user(&user).await {
                Ok(_) => summary.users.imported += 1,
                Err(GatewayError::Conflict(_)) => record_update(&mut summary.users, "users", &key, gateway.update_user(&user).await),
                Err(e) => record_failure(&mut summary.users, "users", &key, &e),
            }
        }
    }

    if let Some(path) = &plan.tasks {
        let rows = read_rows(path)?;
        tracing::info!(rows = rows.len(), path = %path.display(), "importing tasks");
        for task in convert(&rows, "tasks", task_from_row, &mut summary.tasks) {
            let key = task.id.to_string();
            match gateway.insert_task(&task).await {
                Ok(_) => summary.tasks.imported += 1,
                Err(GatewayError::Conflict(_)) => record_update(&mut summary.tasks, "tasks", &key, gateway.replace_task(&task).await),
                Err(e) => record_failure(&mut summary.tasks, "tasks", &key, &e),
            }
        }
    }

    Ok(summary)
}

fn record_update<T>(summary: &mut TableSummary, table: &str, key: &str, result: Result<T, GatewayError>) {
    match result {
        Ok(_) => summary.updated += 1,
        Err(e) => {
            tracing::warn!(table, key, error = %e, "update after conflict failed");
            summary.failed += 1;
        }
    }
}

fn record_failure(summary: &mut TableSummary, table: &str, key: &str, err: &GatewayError) {
    tracing::warn!(table, key, error = %err, "insert failed");
    summary.failed += 1;
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::gateway::local::LocalGateway;

    fn row(line: usize, pairs: &[(&str, &str)]) -> Row {
        Row { line, fields: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() }
    }

    #[test]
    fn delimiter_sniffing() {
        assert_eq!(sniff_delimiter("id;name;level\n1;a;2"), b';');
        assert_eq!(sniff_delimiter("id\tname\n"), b'\t');
        assert_eq!(sniff_delimiter("id,name\n"), b',');
        assert_eq!(sniff_delimiter("id\n"), b',');
    }

    #[test]
    fn parse_rows_strips_bom_and_trims_headers() {
        let rows = parse_rows("\u{feff}id; name ;level\n7;Lin;5\n8;Kao\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].get(&["name"]), Some("Lin"));
        assert_eq!(rows[1].get(&["level"]), None);
    }

    #[test]
    fn booleans() {
        for t in ["true", "1", "YES", "y", "T"] {
            assert!(parse_bool(t), "{t}");
        }
        for f in ["false", "0", "no", "", "maybe"] {
            assert!(!parse_bool(f), "{f}");
        }
    }

    #[test]
    fn role_rows_default_and_clamp() {
        let role = role_from_row(&row(2, &[("id", "porter"), ("level", "9"), ("is_default", "yes")])).unwrap();
        assert_eq!(role.name, "porter");
        assert_eq!(role.level, Level::STAFF);
        assert_eq!(role.icon, IconKind::Briefcase);
        assert_eq!(role.color, DEFAULT_COLOR);
        assert!(role.is_default);
        assert!(role_from_row(&row(3, &[("name", "no id")])).is_err());
        let role = role_from_row(&row(4, &[("id", "x"), ("level", "0")])).unwrap();
        assert_eq!(role.level, Level::OPERATOR);
    }

    #[test]
    fn user_rows_map_alternate_columns() {
        let user = user_from_row(&row(
            2,
            &[("id", "12"), ("name", "Lin"), ("role", "nurse"), ("level", "5"), ("Mail", "lin@ward.example"), ("ID4", "A123")],
        ))
        .unwrap();
        assert_eq!(user.id, 12);
        assert_eq!(user.level, Level::STAFF);
        assert_eq!(user.mail.as_deref(), Some("lin@ward.example"));
        assert_eq!(user.employee_id.as_deref(), Some("A123"));
        assert!(user_from_row(&row(3, &[("id", "13")])).is_err());

        let generated = user_from_row(&row(9, &[("id", "abc"), ("name", "Kao")])).unwrap();
        assert!(generated.id > 1_600_000_000_000);
    }

    #[test]
    fn task_rows_accept_spreadsheet_values() {
        let task = task_from_row(&row(
            5,
            &[
                ("id", "100"),
                ("assignee_id", "12"),
                ("collaborator_ids", "3, 4"),
                ("final_date", "06/30/2025"),
                ("plan_date", "2025/05/01"),
                ("status", "in-progress"),
                ("evidence", r#"[{"id":"1","type":"stat","label":"Done","value":"3"}]"#),
            ],
        ))
        .unwrap();
        assert_eq!(task.title, "Task 5");
        assert_eq!(task.collaborator_ids, BTreeSet::from([3, 4]));
        assert_eq!(task.dates.final_date, NaiveDate::from_ymd_opt(2025, 6, 30));
        assert_eq!(task.dates.plan, NaiveDate::from_ymd_opt(2025, 5, 1));
        assert_eq!(task.status, Status::InProgress);
        assert_eq!(task.evidence.len(), 1);

        assert!(task_from_row(&row(6, &[("assignee_id", "Lin")])).is_err());
        assert!(task_from_row(&row(7, &[("evidence", "{oops")])).is_err());
    }

    #[tokio::test]
    async fn import_orders_tables_and_creates_missing_roles() {
        let dir = tempfile::tempdir().unwrap();
        let roles = dir.path().join("roles.csv");
        let users = dir.path().join("users.csv");
        let tasks = dir.path().join("tasks.csv");
        fs::write(&roles, "id,name,level\npharmacist,Pharmacy,2\n,nameless,3\n").unwrap();
        fs::write(&users, "id;name;role;level\n1;Lin;nurse;5\n2;Tsai;pharmacist;2\n3;;nurse;4\n").unwrap();
        fs::write(&tasks, "id,title,assignee_id,final_date\n50,Audit,1,2025-09-30\n51,Review,x,2025-09-30\n").unwrap();

        let gw = LocalGateway::in_memory();
        let plan = ImportPlan { roles: Some(roles), users: Some(users), tasks: Some(tasks.clone()) };
        let summary = run_import(&gw, &plan).await.unwrap();

        assert_eq!(summary.roles, TableSummary { imported: 1, updated: 0, skipped: 1, failed: 0 });
        assert_eq!(summary.users, TableSummary { imported: 2, updated: 0, skipped: 1, failed: 0 });
        assert_eq!(summary.tasks, TableSummary { imported: 1, updated: 0, skipped: 1, failed: 0 });
        assert_eq!(summary.created_roles, vec!["nurse".to_string()]);
        let nurse = gw.list_roles().await.unwrap().into_iter().find(|r| r.id == "nurse").unwrap();
        assert_eq!(nurse, placeholder_record("nurse"));
        assert_eq!(nurse.color, crate::role::NEUTRAL_COLOR);

        let again = run_import(&gw, &ImportPlan { tasks: Some(tasks), ..ImportPlan::default() }).await.unwrap();
        assert_eq!(again.tasks.updated, 1);
        assert_eq!(gw.list_tasks(None).await.unwrap().len(), 1);
    }
}
