//! Display status derivation and dashboard statistics.
//!
//! The display status is recomputed on every query. It is never cached and
//! never written back: a pending task past its deadline shows as overdue while
//! its stored status stays pending.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::fields::{DisplayStatus, Status};
use crate::task::Task;

/// Compute the status shown for `task` on `today`.
///
/// First match wins: done, then past the final date, then in progress, else pending.
/// A task without a final date is never overdue.
pub fn resolve_display_status(task: &Task, today: NaiveDate) -> DisplayStatus {
    if task.status == Status::Done {
        return DisplayStatus::Done;
    }
    if task.dates.final_date.is_some_and(|d| d < today) {
        return DisplayStatus::Overdue;
    }
    if task.status == Status::InProgress {
        return DisplayStatus::InProgress;
    }
    DisplayStatus::Pending
}

/// Headline counts for a set of tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub done: usize,
    pub overdue: usize,
    pub by_display: BTreeMap<&'static str, usize>,
}

impl TaskStats {
    pub fn collect<'a>(tasks: impl IntoIterator<Item = &'a Task>, today: NaiveDate) -> TaskStats {
        let mut stats = TaskStats::default();
        for status in DisplayStatus::ALL {
            stats.by_display.insert(status.label(), 0);
        }
        for task in tasks {
            stats.total += 1;
            let display = resolve_display_status(task, today);
            match display {
                DisplayStatus::Done => stats.done += 1,
                DisplayStatus::Overdue => stats.overdue += 1,
                _ => {}
            }
            *stats.by_display.entry(display.label()).or_insert(0) += 1;
        }
        stats
    }

    /// Whole-number completion percentage.
    pub fn completion_percent(&self) -> u8 {
        if self.total == 0 {
            0
        } else {
            ((self.done * 100) / self.total) as u8
        }
    }
}

/// Keep tasks of one role category; `None` or `"all"` keeps everything.
pub fn filter_by_category<'a>(tasks: &'a [Task], category: Option<&str>) -> Vec<&'a Task> {
    match category {
        None | Some("all") => tasks.iter().collect(),
        Some(cat) => tasks.iter().filter(|t| t.role_category == cat).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskDates, TaskDraft};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn task(status: Status, final_date: Option<NaiveDate>) -> Task {
        let mut t = Task::from_draft(
            1,
            TaskDraft {
                title: "Discharge planning review".into(),
                assignee_id: Some(2),
                dates: TaskDates { final_date, ..TaskDates::default() },
                ..TaskDraft::default()
            },
        );
        t.status = status;
        t
    }

    #[test]
    fn done_wins_regardless_of_dates() {
        let today = d(2025, 6, 1);
        for final_date in [Some(d(2020, 1, 1)), Some(d(2030, 1, 1)), None] {
            assert_eq!(resolve_display_status(&task(Status::Done, final_date), today), DisplayStatus::Done);
        }
    }

    #[test]
    fn past_deadline_is_overdue_even_in_progress() {
        let today = d(2025, 6, 1);
        for status in [Status::Pending, Status::InProgress, Status::Overdue] {
            let t = task(status, Some(d(2025, 5, 31)));
            assert_eq!(resolve_display_status(&t, today), DisplayStatus::Overdue);
        }
    }

    #[test]
    fn in_progress_until_deadline_passes() {
        let today = d(2025, 6, 1);
        assert_eq!(
            resolve_display_status(&task(Status::InProgress, Some(today)), today),
            DisplayStatus::InProgress
        );
        assert_eq!(
            resolve_display_status(&task(Status::InProgress, Some(d(2025, 7, 1))), today),
            DisplayStatus::InProgress
        );
    }

    #[test]
    fn pending_scenario_depends_on_today() {
        let t = task(Status::Pending, Some(d(2025, 1, 1)));
        assert_eq!(resolve_display_status(&t, d(2025, 6, 1)), DisplayStatus::Overdue);
        assert_eq!(resolve_display_status(&t, d(2024, 1, 1)), DisplayStatus::Pending);
    }

    #[test]
    fn persisted_overdue_without_passed_deadline_shows_pending() {
        let t = task(Status::Overdue, Some(d(2025, 12, 31)));
        assert_eq!(resolve_display_status(&t, d(2025, 6, 1)), DisplayStatus::Pending);
    }

    #[test]
    fn missing_final_date_is_never_overdue() {
        let t = task(Status::Pending, None);
        assert_eq!(resolve_display_status(&t, d(2025, 6, 1)), DisplayStatus::Pending);
    }

    #[test]
    fn stats_count_done_and_overdue() {
        let today = d(2025, 6, 1);
        let mut tasks = vec![
            task(Status::Done, Some(d(2025, 1, 1))),
            task(Status::Pending, Some(d(2025, 1, 1))),
            task(Status::InProgress, Some(d(2025, 9, 1))),
            task(Status::Pending, Some(d(2025, 9, 1))),
        ];
        tasks[1].role_category = "nurse".into();
        let stats = TaskStats::collect(&tasks, today);
        assert_eq!((stats.total, stats.done, stats.overdue), (4, 1, 1));
        assert_eq!(stats.by_display["In progress"], 1);
        assert_eq!(stats.completion_percent(), 25);

        let nurse = filter_by_category(&tasks, Some("nurse"));
        assert_eq!(nurse.len(), 1);
        assert_eq!(filter_by_category(&tasks, Some("all")).len(), 4);
    }
}
