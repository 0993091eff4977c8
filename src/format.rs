//! Plain-text rendering for the command line.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::dates::{format_date, format_deadline_relative};
use crate::evidence::{render_kind, RenderKind};
use crate::fields::{icon_for, SortKey};
use crate::hierarchy::RoleSet;
use crate::status::{resolve_display_status, TaskStats};
use crate::task::{Evidence, Task};
use crate::user::User;

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Id to name lookup for rendering assignees.
pub fn name_index(users: &[User]) -> HashMap<u64, &str> {
    users.iter().map(|u| (u.id, u.name.as_str())).collect()
}

fn person(id: Option<u64>, names: &HashMap<u64, &str>) -> String {
    match id {
        None => "-".into(),
        Some(id) => names.get(&id).map(|n| n.to_string()).unwrap_or_else(|| format!("#{id}")),
    }
}

pub fn sort_tasks(tasks: &mut [Task], key: SortKey, today: NaiveDate) {
    match key {
        SortKey::Id => tasks.sort_by_key(|t| t.id),
        SortKey::Deadline => tasks.sort_by_key(|t| (t.dates.final_date.is_none(), t.dates.final_date, t.id)),
        SortKey::Status => {
            tasks.sort_by_key(|t| (resolve_display_status(t, today).urgency_rank(), t.dates.final_date, t.id))
        }
    }
}

pub fn print_task_table(tasks: &[Task], users: &[User], roles: &RoleSet, today: NaiveDate) {
    let names = name_index(users);
    println!("{:<14} {:<12} {:<12} {:<14} {:<14} {}", "ID", "Status", "Due", "Role", "Assignee", "Title");
    for t in tasks {
        println!(
            "{:<14} {:<12} {:<12} {:<14} {:<14} {}",
            t.id,
            resolve_display_status(t, today).label(),
            format_deadline_relative(t.dates.final_date, today),
            truncate(&roles.display_name(&t.role_category), 14),
            truncate(&person(t.assignee_id, &names), 14),
            t.title
        );
    }
}

fn evidence_line(item: &Evidence) -> String {
    let kind = render_kind(item);
    let glyph = icon_for(kind.icon()).glyph;
    match item {
        Evidence::Stat { label, value, sub, trend, .. } => {
            let arrow = match kind {
                RenderKind::Stat { trending: true } => " ↑",
                _ => "",
            };
            let trend = trend.as_deref().map(|t| format!(" ({t})")).unwrap_or_default();
            let sub = sub.as_deref().map(|s| format!(" {s}")).unwrap_or_default();
            format!("{glyph} {label}: {value}{sub}{trend}{arrow}")
        }
        Evidence::Link { name, url, .. } | Evidence::Image { name, url, .. } => format!("{glyph} {name} <{url}>"),
    }
}

pub fn print_task_detail(task: &Task, users: &[User], roles: &RoleSet, today: NaiveDate) {
    let names = name_index(users);
    let collaborators: Vec<String> = task.collaborator_ids.iter().map(|id| person(Some(*id), &names)).collect();
    println!("#{} {}", task.id, task.title);
    println!("  Status:        {} (stored: {})", resolve_display_status(task, today).label(), task.status);
    println!("  Role:          {}", roles.display_name(&task.role_category));
    println!("  Assigned by:   {}", person(task.assigner_id, &names));
    println!("  Assignee:      {}", person(task.assignee_id, &names));
    if !collaborators.is_empty() {
        println!("  Collaborators: {}", collaborators.join(", "));
    }
    println!(
        "  Dates:         plan {} | interim {} | final {} ({})",
        format_date(task.dates.plan),
        format_date(task.dates.interim),
        format_date(task.dates.final_date),
        format_deadline_relative(task.dates.final_date, today)
    );
    if !task.description.is_empty() {
        println!("\n{}", task.description);
    }
    if let Some(response) = task.assignee_response.as_deref().filter(|r| !r.is_empty()) {
        println!("\nResponse:\n{response}");
    }
    if !task.evidence.is_empty() {
        println!("\nEvidence:");
        for item in &task.evidence {
            println!("  [{}] {}", item.id(), evidence_line(item));
        }
    }
}

pub fn print_users_table(users: &[User], roles: &RoleSet) {
    println!("{:<14} {:<4} {:<18} {:<16} {}", "ID", "Lvl", "Name", "Role", "Mail");
    for u in users {
        println!(
            "{:<14} {:<4} {:<18} {:<16} {}",
            u.id,
            u.level.get(),
            truncate(&u.name, 18),
            truncate(&roles.display_name(&u.role), 16),
            u.mail.as_deref().unwrap_or("-")
        );
    }
}

pub fn print_roles_table(roles: &RoleSet, counts: &std::collections::BTreeMap<String, usize>) {
    println!("{:<16} {:<3} {:<18} {:<4} {:<6} {}", "ID", "", "Name", "Lvl", "Users", "Source");
    for r in roles.all() {
        let source = if r.is_synthesized() {
            "observed"
        } else if r.is_default() {
            "built-in"
        } else {
            "custom"
        };
        println!(
            "{:<16} {:<3} {:<18} {:<4} {:<6} {}",
            truncate(r.id(), 16),
            icon_for(r.icon()).glyph,
            truncate(r.name(), 18),
            r.level().get(),
            counts.get(r.id()).copied().unwrap_or(0),
            source
        );
    }
}

pub fn print_stats(stats: &TaskStats) {
    println!("Tasks:      {}", stats.total);
    println!("Done:       {} ({}%)", stats.done, stats.completion_percent());
    println!("Overdue:    {}", stats.overdue);
    for (label, n) in &stats.by_display {
        println!("  {label:<12} {n}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Status;
    use crate::task::TaskDates;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn task(id: u64, status: Status, final_date: Option<NaiveDate>) -> Task {
        Task {
            id,
            title: format!("t{id}"),
            description: String::new(),
            assigner_id: None,
            assignee_id: None,
            collaborator_ids: Default::default(),
            role_category: String::new(),
            dates: TaskDates { plan: None, interim: None, final_date },
            status,
            assignee_response: None,
            evidence: Vec::new(),
        }
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
        assert_eq!(truncate("護理師護理師", 3), "護理…");
    }

    #[test]
    fn status_sort_puts_overdue_first() {
        let today = d(2025, 6, 10);
        let mut tasks = vec![
            task(1, Status::Done, Some(d(2025, 6, 1))),
            task(2, Status::Pending, Some(d(2025, 6, 20))),
            task(3, Status::InProgress, Some(d(2025, 6, 1))),
        ];
        sort_tasks(&mut tasks, SortKey::Status, today);
        assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[test]
    fn deadline_sort_puts_undated_last() {
        let today = d(2025, 6, 10);
        let mut tasks = vec![task(1, Status::Pending, None), task(2, Status::Pending, Some(d(2025, 7, 1)))];
        sort_tasks(&mut tasks, SortKey::Deadline, today);
        assert_eq!(tasks[0].id, 2);
    }

    #[test]
    fn unknown_people_render_by_id() {
        let users = vec![User {
            id: 7,
            name: "Lin".into(),
            role: "nurse".into(),
            level: Default::default(),
            mail: None,
            employee_id: None,
            avatar: None,
        }];
        let names = name_index(&users);
        assert_eq!(person(Some(7), &names), "Lin");
        assert_eq!(person(Some(8), &names), "#8");
        assert_eq!(person(None, &names), "-");
    }
}
