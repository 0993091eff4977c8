//! Date parsing and formatting helpers.
//!
//! Task milestones are calendar dates. Stored values are `YYYY-MM-DD`, so the
//! chronological order of `NaiveDate` matches the lexicographic order of the
//! stored strings.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};

/// Current calendar day in local time.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a date as stored by a backend.
///
/// Accepts `YYYY-MM-DD` and full timestamps (only the date part is kept).
/// Empty strings are treated as absent.
pub fn parse_stored_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Parse dates the way spreadsheets export them, trying each layout in turn.
pub fn parse_flexible_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Parse human-readable date input relative to `today`.
///
/// Supports:
/// - "today", "tomorrow", "yesterday"
/// - "end of week", "end of month"
/// - "in 3d", "in 2w", "in 1m"
/// - weekday names, optionally prefixed with "next"
/// - any layout accepted by [`parse_flexible_date`]
pub fn parse_date_input(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();

    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "yesterday" => return Some(today - Duration::days(1)),
        "end of week" | "eow" => {
            let weekday = today.weekday().num_days_from_monday() as i64;
            return Some(today + Duration::days(6 - weekday));
        }
        "end of month" | "eom" => {
            let (year, month) = if today.month() == 12 {
                (today.year() + 1, 1)
            } else {
                (today.year(), today.month() + 1)
            };
            let first_of_next = NaiveDate::from_ymd_opt(year, month, 1)?;
            return Some(first_of_next - Duration::days(1));
        }
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        let rest = rest.trim();
        let unit_start = rest.char_indices().last().map(|(i, _)| i).unwrap_or(0);
        let (num, unit) = rest.split_at(unit_start);
        if let Ok(n) = num.trim().parse::<i64>() {
            // Approximate: 30 days per month. Overflowing offsets read as unparseable.
            let offset = match unit {
                "d" => Some(Duration::try_days(n)),
                "w" => Some(Duration::try_weeks(n)),
                "m" => Some(n.checked_mul(30).and_then(Duration::try_days)),
                _ => None,
            };
            if let Some(offset) = offset {
                return offset.and_then(|delta| today.checked_add_signed(delta));
            }
        }
    }

    let weekdays = [
        ("monday", 0), ("tuesday", 1), ("wednesday", 2), ("thursday", 3),
        ("friday", 4), ("saturday", 5), ("sunday", 6),
        ("mon", 0), ("tue", 1), ("wed", 2), ("thu", 3),
        ("fri", 4), ("sat", 5), ("sun", 6),
    ];
    let (next_week, day_part) = match s.strip_prefix("next ") {
        Some(rest) => (true, rest),
        None => (false, s.as_str()),
    };
    for (day_name, target_day) in weekdays {
        if day_part == day_name {
            let current_day = today.weekday().num_days_from_monday() as i64;
            let days_ahead = (target_day + 7 - current_day) % 7;
            let days_to_add = if next_week {
                if days_ahead == 0 { 7 } else { days_ahead + 7 }
            } else {
                days_ahead
            };
            return Some(today + Duration::days(days_to_add));
        }
    }

    parse_flexible_date(&s)
}

/// Format a deadline relative to today ("today", "tomorrow", "in 3d", "2d late").
pub fn format_deadline_relative(date: Option<NaiveDate>, today: NaiveDate) -> String {
    match date {
        None => "-".into(),
        Some(d) => {
            let delta = (d - today).num_days();
            if delta == 0 {
                "today".into()
            } else if delta == 1 {
                "tomorrow".into()
            } else if delta > 1 {
                format!("in {delta}d")
            } else {
                format!("{}d late", -delta)
            }
        }
    }
}

/// Render an optional date as `YYYY-MM-DD` or `-`.
pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn stored_dates_tolerate_timestamps_and_blanks() {
        assert_eq!(parse_stored_date("2025-06-01"), Some(d(2025, 6, 1)));
        assert_eq!(parse_stored_date("2025-06-01T08:00:00+08:00"), Some(d(2025, 6, 1)));
        assert_eq!(parse_stored_date(""), None);
        assert_eq!(parse_stored_date("soon"), None);
    }

    #[test]
    fn spreadsheet_layouts() {
        assert_eq!(parse_flexible_date("2025/03/04"), Some(d(2025, 3, 4)));
        assert_eq!(parse_flexible_date("03/04/2025"), Some(d(2025, 3, 4)));
        assert_eq!(parse_flexible_date("25/12/2025"), Some(d(2025, 12, 25)));
        assert_eq!(parse_flexible_date("2025-03-04 10:30:00"), Some(d(2025, 3, 4)));
        assert_eq!(parse_flexible_date("n/a"), None);
    }

    #[test]
    fn relative_input() {
        // 2025-06-04 is a Wednesday.
        let today = d(2025, 6, 4);
        assert_eq!(parse_date_input("today", today), Some(today));
        assert_eq!(parse_date_input("in 3d", today), Some(d(2025, 6, 7)));
        assert_eq!(parse_date_input("in 2w", today), Some(d(2025, 6, 18)));
        assert_eq!(parse_date_input("eom", today), Some(d(2025, 6, 30)));
        assert_eq!(parse_date_input("eow", today), Some(d(2025, 6, 8)));
        assert_eq!(parse_date_input("friday", today), Some(d(2025, 6, 6)));
        assert_eq!(parse_date_input("next wed", today), Some(d(2025, 6, 11)));
        assert_eq!(parse_date_input("2025-12-31", today), Some(d(2025, 12, 31)));
        assert_eq!(parse_date_input("whenever", today), None);
    }

    #[test]
    fn huge_offsets_are_unreadable_not_fatal() {
        let today = d(2025, 6, 1);
        assert_eq!(parse_date_input("in 9999999999m", today), None);
        assert_eq!(parse_date_input("in 9223372036854775807d", today), None);
        assert_eq!(parse_date_input("in 999999999999w", today), None);
        assert_eq!(parse_date_input("in -9999999999m", today), None);
        assert_eq!(parse_date_input("in 1m", today), Some(d(2025, 7, 1)));
    }

    #[test]
    fn relative_formatting() {
        let today = d(2025, 6, 4);
        assert_eq!(format_deadline_relative(Some(today), today), "today");
        assert_eq!(format_deadline_relative(Some(d(2025, 6, 5)), today), "tomorrow");
        assert_eq!(format_deadline_relative(Some(d(2025, 6, 9)), today), "in 5d");
        assert_eq!(format_deadline_relative(Some(d(2025, 6, 1)), today), "3d late");
        assert_eq!(format_deadline_relative(None, today), "-");
    }
}
