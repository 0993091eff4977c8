//! Command implementations for the CLI interface.
//!
//! Each handler drives one [`Board`] operation on the shared runtime, prints
//! the result, and on failure prints the error and exits with status 1.

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Subcommand;
use clap_complete::{generate, Shell};
use serde::Serialize;
use tokio::runtime::Runtime;

use crate::dates::{parse_date_input, today};
use crate::error::{BoardError, OperationReport};
use crate::evidence::EvidenceDraft;
use crate::fields::{DisplayStatus, IconKind, Level, SortKey, Status};
use crate::format::*;
use crate::hierarchy::{level_counts, observed_role_ids, role_counts, UserPicker};
use crate::import::{run_import, ImportPlan};
use crate::role::RoleDraft;
use crate::service::{Board, RosterSource, WriteKind};
use crate::status::resolve_display_status;
use crate::task::{EvidenceKind, TaskDates, TaskDraft};
use crate::user::{User, UserDraft};

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the interactive dashboard.
    Ui,

    /// Create, list and update tasks.
    Tasks {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Manage the evidence attached to a task.
    Evidence {
        #[command(subcommand)]
        action: EvidenceAction,
    },

    /// Manage users.
    Users {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage roles.
    Roles {
        #[command(subcommand)]
        action: RoleAction,
    },

    /// Browse people by level, then role.
    Pick {
        /// Level 1 (operator) to 4 (staff).
        #[arg(long)]
        level: Option<i64>,
        /// Narrow to one role at that level.
        #[arg(long)]
        role: Option<String>,
        /// Confirm a user id from the current selection.
        #[arg(long)]
        user: Option<u64>,
    },

    /// Show completion and overdue counts.
    Stats {
        /// Role category, or "all".
        #[arg(long)]
        role: Option<String>,
    },

    /// Import roles, users and tasks from CSV files.
    Import {
        #[arg(long)]
        roles: Option<PathBuf>,
        #[arg(long)]
        users: Option<PathBuf>,
        #[arg(long)]
        tasks: Option<PathBuf>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// List tasks.
    List {
        /// Role category, or "all".
        #[arg(long)]
        role: Option<String>,
        /// Only tasks currently shown with this status.
        #[arg(long, value_enum)]
        status: Option<DisplayStatus>,
        /// Sort key.
        #[arg(long, value_enum, default_value_t = SortKey::Deadline)]
        sort: SortKey,
        /// Limit number of rows printed.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one task with its evidence.
    View { id: u64 },

    /// Assign a new task.
    Add {
        title: String,
        #[arg(long)]
        desc: Option<String>,
        /// Assignee user id.
        #[arg(long)]
        assignee: Option<u64>,
        /// Assigner user id.
        #[arg(long)]
        assigner: Option<u64>,
        /// Collaborator user ids. May be repeated and comma-separated.
        #[arg(long = "collab", value_delimiter = ',')]
        collaborators: Vec<u64>,
        /// Role category.
        #[arg(long)]
        role: Option<String>,
        /// Planning date: YYYY-MM-DD, "today", "in 3d", "next fri", ...
        #[arg(long)]
        plan: Option<String>,
        /// Interim check-in date.
        #[arg(long)]
        interim: Option<String>,
        /// Final deadline (required).
        #[arg(long = "final")]
        final_date: Option<String>,
        /// Rewrite the description with the text analyzer first.
        #[arg(long)]
        ai: bool,
    },

    /// Set the stored status of a task.
    Status {
        id: u64,
        #[arg(value_enum)]
        status: Status,
    },

    /// Save the assignee's response. Starts a pending task.
    Respond { id: u64, text: String },
}

#[derive(Subcommand)]
pub enum EvidenceAction {
    /// List the evidence on a task.
    List { task: u64 },

    /// Attach a statistic, link or image.
    Add {
        task: u64,
        #[arg(long, value_enum)]
        kind: EvidenceKind,
        /// Stat label, or link/image name.
        #[arg(long, default_value = "")]
        caption: String,
        /// Stat value, or link/image URL.
        #[arg(long)]
        value: String,
        /// Secondary stat text.
        #[arg(long)]
        sub: Option<String>,
        /// Stat trend, e.g. "+12%".
        #[arg(long)]
        trend: Option<String>,
    },

    /// Remove an item by its id.
    Rm { task: u64, evidence: String },
}

#[derive(Subcommand)]
pub enum UserAction {
    /// List users.
    List {
        #[arg(long)]
        level: Option<i64>,
        #[arg(long)]
        role: Option<String>,
    },

    /// Add a user.
    Add {
        name: String,
        #[arg(long)]
        role: String,
        /// Defaults to the role's level.
        #[arg(long)]
        level: Option<i64>,
        #[arg(long)]
        mail: Option<String>,
        #[arg(long)]
        employee_id: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
    },

    /// Change a user's fields.
    Edit {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        level: Option<i64>,
        #[arg(long)]
        mail: Option<String>,
        #[arg(long)]
        employee_id: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
    },

    /// Delete a user no task refers to.
    Rm { id: u64 },
}

#[derive(Subcommand)]
pub enum RoleAction {
    /// List every known role.
    List,

    /// Add a custom role.
    Add {
        id: String,
        name: String,
        /// Icon name, e.g. HeartPulse or Stethoscope.
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        level: Option<i64>,
        #[arg(long)]
        webhook: Option<String>,
    },

    /// Edit a custom role. The id cannot change.
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        level: Option<i64>,
        #[arg(long)]
        webhook: Option<String>,
    },

    /// Delete a custom role nobody holds.
    Rm { id: String },

    /// Copy roles from the backend into the local role store.
    Sync,
}

/// Everything a handler needs: the runtime and the board it drives.
pub struct Session {
    pub rt: Runtime,
    pub board: Board,
    pub json: bool,
}

impl Session {
    fn fail(&self, err: &BoardError) -> ! {
        if self.json {
            println!("{}", serde_json::to_string(&OperationReport::failed(err)).unwrap_or_default());
        } else {
            eprintln!("Error: {}", err.user_message());
        }
        std::process::exit(1);
    }

    fn done(&self, message: String) {
        if self.json {
            println!("{}", serde_json::to_string(&OperationReport::ok(message)).unwrap_or_default());
        } else {
            println!("{message}");
        }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Failed to encode output: {e}");
                std::process::exit(1);
            }
        }
    }

    fn run<T>(&self, fut: impl std::future::Future<Output = Result<T, BoardError>>) -> T {
        match self.rt.block_on(fut) {
            Ok(v) => v,
            Err(e) => self.fail(&e),
        }
    }
}

fn parse_date_arg(label: &'static str, raw: Option<String>) -> Result<Option<chrono::NaiveDate>, BoardError> {
    match raw {
        None => Ok(None),
        Some(s) => parse_date_input(&s, today())
            .map(Some)
            .ok_or_else(|| BoardError::validation(label, format!("could not read date {s:?}"))),
    }
}

fn task_dates(plan: Option<String>, interim: Option<String>, final_date: Option<String>) -> Result<TaskDates, BoardError> {
    Ok(TaskDates {
        plan: parse_date_arg("plan date", plan)?,
        interim: parse_date_arg("interim date", interim)?,
        final_date: parse_date_arg("final date", final_date)?,
    })
}

pub fn cmd_tasks(s: &Session, action: TaskAction) {
    match action {
        TaskAction::List { role, status, sort, limit } => {
            let today = today();
            let mut tasks = s.run(s.board.list_tasks(role.as_deref()));
            if let Some(wanted) = status {
                tasks.retain(|t| resolve_display_status(t, today) == wanted);
            }
            sort_tasks(&mut tasks, sort, today);
            if let Some(n) = limit {
                tasks.truncate(n);
            }
            if s.json {
                return s.print_json(&tasks);
            }
            let roster = s.rt.block_on(s.board.roster());
            let roles = s.board.local_role_set(&observed_role_ids(&roster.users));
            print_task_table(&tasks, &roster.users, &roles, today);
        }
        TaskAction::View { id } => {
            let task = s.run(s.board.get_task(id));
            if s.json {
                return s.print_json(&task);
            }
            let roster = s.rt.block_on(s.board.roster());
            let roles = s.board.local_role_set(&observed_role_ids(&roster.users));
            print_task_detail(&task, &roster.users, &roles, today());
        }
        TaskAction::Add { title, desc, assignee, assigner, collaborators, role, plan, interim, final_date, ai } => {
            let dates = match task_dates(plan, interim, final_date) {
                Ok(d) => d,
                Err(e) => s.fail(&e),
            };
            let mut description = desc.unwrap_or_default();
            if ai {
                match s.rt.block_on(s.board.describe_with_ai(&description)) {
                    Ok(cleaned) => description = cleaned,
                    Err(e) => eprintln!("Text analysis failed ({e}); keeping the original description."),
                }
            }
            let draft = TaskDraft {
                title,
                description,
                assigner_id: assigner,
                assignee_id: assignee,
                collaborator_ids: collaborators.into_iter().collect::<BTreeSet<u64>>(),
                role_category: role.unwrap_or_default(),
                dates,
            };
            let task = s.run(s.board.create_task(draft));
            s.done(format!("Created task #{}: {}", task.id, task.title));
        }
        TaskAction::Status { id, status } => {
            s.run(s.board.update_status(id, status));
            s.done(format!("Task #{id} is now {status}"));
        }
        TaskAction::Respond { id, text } => {
            let status = s.run(s.board.update_response(id, &text));
            s.done(format!("Response saved on task #{id} ({status})"));
        }
    }
}

pub fn cmd_evidence(s: &Session, action: EvidenceAction) {
    match action {
        EvidenceAction::List { task } => {
            let task = s.run(s.board.get_task(task));
            if s.json {
                return s.print_json(&task.evidence);
            }
            if task.evidence.is_empty() {
                println!("No evidence on task #{}.", task.id);
            }
            for item in &task.evidence {
                println!("[{}] {:<6} {}", item.id(), format!("{:?}", item.kind()).to_lowercase(), item.caption());
            }
        }
        EvidenceAction::Add { task, kind, caption, value, sub, trend } => {
            let draft = EvidenceDraft { kind, caption, value, sub, trend };
            let item = s.run(s.board.add_evidence(task, draft));
            s.done(format!("Added evidence {} to task #{task}", item.id()));
        }
        EvidenceAction::Rm { task, evidence } => {
            let before = s.run(s.board.get_task(task)).evidence.len();
            let after = s.run(s.board.remove_evidence(task, &evidence));
            if after.len() == before {
                s.done(format!("Task #{task} has no evidence {evidence}; nothing changed"));
            } else {
                s.done(format!("Removed evidence {evidence} from task #{task}"));
            }
        }
    }
}

/// Level then role, as in the pickers. A role alone is refused.
fn filter_users(users: &[User], level: Option<i64>, role: Option<String>) -> Result<Vec<User>, BoardError> {
    let mut picker = UserPicker::new();
    if let Some(level) = level {
        picker.select_level(Level::normalize(level));
    }
    if let Some(role) = role {
        picker.select_role(role)?;
    }
    if picker.level().is_none() {
        return Ok(users.to_vec());
    }
    Ok(picker.candidates(users).into_iter().cloned().collect())
}

pub fn cmd_users(s: &Session, action: UserAction) {
    match action {
        UserAction::List { level, role } => {
            let roster = s.rt.block_on(s.board.roster());
            if let RosterSource::Fallback { reason } = &roster.source {
                eprintln!("Showing the sample roster: {reason}");
            }
            let users = filter_users(&roster.users, level, role).unwrap_or_else(|e| s.fail(&e));
            if s.json {
                return s.print_json(&users);
            }
            let roles = s.board.local_role_set(&observed_role_ids(&roster.users));
            print_users_table(&users, &roles);
        }
        UserAction::Add { name, role, level, mail, employee_id, avatar } => {
            let draft = UserDraft { name, role, level: level.map(Level::normalize), mail, employee_id, avatar };
            let user = s.run(s.board.create_user(draft));
            s.done(format!("Created user #{} {} ({})", user.id, user.name, user.level));
        }
        UserAction::Edit { id, name, role, level, mail, employee_id, avatar } => {
            let users = s.run(s.board.list_users());
            let Some(mut user) = users.into_iter().find(|u| u.id == id) else {
                s.fail(&BoardError::not_found("user", id));
            };
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(role) = role {
                user.role = role;
            }
            if let Some(level) = level {
                user.level = Level::normalize(level);
            }
            if mail.is_some() {
                user.mail = mail.filter(|m| !m.is_empty());
            }
            if employee_id.is_some() {
                user.employee_id = employee_id.filter(|m| !m.is_empty());
            }
            if avatar.is_some() {
                user.avatar = avatar.filter(|m| !m.is_empty());
            }
            let user = s.run(s.board.update_user(user));
            s.done(format!("Updated user #{} {}", user.id, user.name));
        }
        UserAction::Rm { id } => {
            s.run(s.board.delete_user(id));
            s.done(format!("Deleted user #{id}"));
        }
    }
}

pub fn cmd_roles(s: &mut Session, action: RoleAction) {
    match action {
        RoleAction::List => {
            let users = s.rt.block_on(s.board.roster()).users;
            let roles = match s.rt.block_on(s.board.role_set()) {
                Ok(set) => set,
                Err(e) => {
                    tracing::warn!(error = %e, "falling back to roles referenced by the roster");
                    s.board.local_role_set(&observed_role_ids(&users))
                }
            };
            if s.json {
                let records: Vec<_> = roles.all().iter().map(|r| r.to_record()).collect();
                return s.print_json(&records);
            }
            print_roles_table(&roles, &role_counts(&users));
        }
        RoleAction::Add { id, name, icon, color, level, webhook } => {
            let draft = RoleDraft {
                id,
                name,
                icon: icon.as_deref().map(IconKind::from_name),
                color,
                level: level.map(Level::normalize),
                webhook,
            };
            let record = match s.rt.block_on(s.board.create_role(draft)) {
                Ok(r) => r,
                Err(e) => s.fail(&e),
            };
            s.done(format!("Created role {} ({})", record.id, record.name));
        }
        RoleAction::Edit { id, name, icon, color, level, webhook } => {
            let current = s.board.custom_roles().iter().find(|r| r.id == id).map(|r| r.name.clone());
            let draft = RoleDraft {
                name: name.or(current).unwrap_or_default(),
                id,
                icon: icon.as_deref().map(IconKind::from_name),
                color,
                level: level.map(Level::normalize),
                webhook,
            };
            let record = match s.rt.block_on(s.board.edit_role(draft)) {
                Ok(r) => r,
                Err(e) => s.fail(&e),
            };
            s.done(format!("Updated role {} ({})", record.id, record.name));
        }
        RoleAction::Rm { id } => {
            if let Err(e) = s.rt.block_on(s.board.delete_role(&id)) {
                s.fail(&e);
            }
            s.done(format!("Deleted role {id}"));
        }
        RoleAction::Sync => {
            let report = match s.rt.block_on(s.board.sync_roles()) {
                Ok(r) => r,
                Err(e) => s.fail(&e),
            };
            s.done(format!(
                "Synced roles: {} added ({}), {} already known",
                report.added.len(),
                report.added.join(", "),
                report.skipped.len()
            ));
        }
    }
}

pub fn cmd_pick(s: &Session, level: Option<i64>, role: Option<String>, user: Option<u64>) {
    let roster = s.rt.block_on(s.board.roster());
    let roles = s.board.local_role_set(&observed_role_ids(&roster.users));
    let mut picker = UserPicker::new();

    let Some(level) = level else {
        println!("Choose a level with --level:");
        for (level, n) in level_counts(&roster.users) {
            println!("  {:<16} {n} people", level.to_string());
        }
        return;
    };
    picker.select_level(Level::normalize(level));
    if let Some(role) = role {
        if let Err(e) = picker.select_role(role) {
            s.fail(&e);
        }
    }

    if let Some(id) = user {
        match picker.pick(&roster.users, id) {
            Ok(u) => s.done(format!("Picked #{} {} ({})", u.id, u.name, roles.display_name(&u.role))),
            Err(e) => s.fail(&e),
        }
        return;
    }

    if picker.role().is_none() {
        println!("Roles at {}:", Level::normalize(level));
        for (role, n) in picker.roles_at_level(&roster.users) {
            println!("  {:<16} {n}", roles.display_name(&role));
        }
        println!();
    }
    let candidates: Vec<_> = picker.candidates(&roster.users).into_iter().cloned().collect();
    print_users_table(&candidates, &roles);
}

pub fn cmd_stats(s: &Session, role: Option<String>) {
    let stats = s.run(s.board.stats(role.as_deref(), today()));
    if s.json {
        return s.print_json(&stats);
    }
    println!("Backend: {}", s.board.gateway().describe());
    if let Some(role) = role.filter(|r| r != "all") {
        println!("Role: {role}");
    }
    print_stats(&stats);
}

pub fn cmd_import(s: &Session, roles: Option<PathBuf>, users: Option<PathBuf>, tasks: Option<PathBuf>) {
    if roles.is_none() && users.is_none() && tasks.is_none() {
        eprintln!("Nothing to import: pass --roles, --users and/or --tasks.");
        std::process::exit(1);
    }
    let plan = ImportPlan { roles, users, tasks };
    let summary = match s.rt.block_on(run_import(s.board.gateway().as_ref(), &plan)) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Import failed: {e}");
            std::process::exit(1);
        }
    };
    s.rt.block_on(s.board.settle(WriteKind::Create));
    if s.json {
        return s.print_json(&summary);
    }
    for (table, t) in [("roles", &summary.roles), ("users", &summary.users), ("tasks", &summary.tasks)] {
        println!(
            "{table:<6} imported {:>4}  updated {:>4}  skipped {:>4}  failed {:>4}",
            t.imported, t.updated, t.skipped, t.failed
        );
    }
    if !summary.created_roles.is_empty() {
        println!("Created placeholder roles: {}", summary.created_roles.join(", "));
    }
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn staff(id: u64, role: &str, level: i64) -> User {
        User {
            id,
            name: format!("staff-{id}"),
            role: role.into(),
            level: Level::normalize(level),
            mail: None,
            employee_id: None,
            avatar: None,
        }
    }

    #[test]
    fn user_listing_needs_a_level_before_a_role() {
        let users = vec![staff(1, "nurse", 3), staff(2, "nurse", 4), staff(3, "porter", 4), staff(4, "ot", 4)];
        assert_matches!(
            filter_users(&users, None, Some("nurse".into())),
            Err(BoardError::Validation { field: "level", .. })
        );
        assert_eq!(filter_users(&users, None, None).unwrap().len(), 4);
        let ids: Vec<u64> = filter_users(&users, Some(4), None).unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![2, 3]);
        let ids: Vec<u64> = filter_users(&users, Some(4), Some("nurse".into())).unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![2]);
    }
}
