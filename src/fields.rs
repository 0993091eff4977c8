//! Enumerations and small value types shared across the board.
//!
//! This module defines the persisted task status, the derived display status,
//! the hierarchy `Level` with its normalization rules, and the icon registry
//! keys that roles and evidence refer to.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};

/// Persisted task lifecycle value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    #[serde(alias = "Pending", alias = "open")]
    Pending,
    #[serde(alias = "InProgress", alias = "in-progress")]
    InProgress,
    #[serde(alias = "Done")]
    Done,
    #[serde(alias = "Overdue")]
    Overdue,
}

impl Status {
    /// Wire name as stored by the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Overdue => "overdue",
        }
    }

    /// Lenient parse used by importers; unknown values fall back to `Pending`.
    pub fn parse_lenient(s: &str) -> Status {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "in_progress" | "inprogress" => Status::InProgress,
            "done" => Status::Done,
            "overdue" => Status::Overdue,
            _ => Status::Pending,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computed state shown to users. Never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Done,
    Overdue,
    InProgress,
    Pending,
}

impl DisplayStatus {
    pub const ALL: [DisplayStatus; 4] = [
        DisplayStatus::Overdue,
        DisplayStatus::InProgress,
        DisplayStatus::Pending,
        DisplayStatus::Done,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DisplayStatus::Done => "Done",
            DisplayStatus::Overdue => "Overdue",
            DisplayStatus::InProgress => "In progress",
            DisplayStatus::Pending => "Pending",
        }
    }

    /// Ordering used when sorting boards: the most urgent states come first.
    pub fn urgency_rank(self) -> u8 {
        match self {
            DisplayStatus::Overdue => 0,
            DisplayStatus::InProgress => 1,
            DisplayStatus::Pending => 2,
            DisplayStatus::Done => 3,
        }
    }
}

/// Hierarchy rank of a user or the default rank suggested by a role.
///
/// 1 is the highest rank ("operator") and 4 is general staff. The value 5 is a
/// retired tier that was merged into 4; every constructor funnels through
/// [`Level::normalize`] so the two can never diverge again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Level(u8);

impl Level {
    pub const OPERATOR: Level = Level(1);
    pub const MANAGER: Level = Level(2);
    pub const SUPERVISOR: Level = Level(3);
    pub const STAFF: Level = Level(4);

    pub const ALL: [Level; 4] = [Level::OPERATOR, Level::MANAGER, Level::SUPERVISOR, Level::STAFF];

    /// Normalize any raw integer: 5 becomes 4, everything else is clamped into 1..=4.
    pub fn normalize(raw: i64) -> Level {
        let raw = if raw == 5 { 4 } else { raw };
        Level(raw.clamp(1, 4) as u8)
    }

    /// Missing values normalize to staff.
    pub fn from_optional(raw: Option<i64>) -> Level {
        raw.map(Level::normalize).unwrap_or(Level::STAFF)
    }

    /// Normalize a loosely typed storage value (number, numeric string, null).
    pub fn from_json(raw: Option<&serde_json::Value>) -> Level {
        match raw {
            Some(serde_json::Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Level::normalize(i)
                } else if let Some(f) = n.as_f64() {
                    Level::normalize(f.trunc() as i64)
                } else {
                    Level::STAFF
                }
            }
            Some(serde_json::Value::String(s)) => Level::parse_lenient(s),
            _ => Level::STAFF,
        }
    }

    /// Normalize free-form text input; non-numeric input becomes staff.
    pub fn parse_lenient(s: &str) -> Level {
        Level::from_optional(s.trim().parse::<i64>().ok())
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Operator",
            2 => "Manager",
            3 => "Supervisor",
            _ => "Staff",
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::STAFF
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} {}", self.0, self.label())
    }
}

impl FromStr for Level {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Level::parse_lenient(s))
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(Level::from_json(raw.as_ref()))
    }
}

/// Keys into the fixed icon registry. Persisted by name, never as a live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Default)]
pub enum IconKind {
    #[default]
    Briefcase,
    HeartPulse,
    Activity,
    Users,
    Stethoscope,
    Folder,
    Link,
    Image,
    Chart,
}

impl IconKind {
    /// Icon used for placeholder roles and unknown registry names.
    pub const GENERIC: IconKind = IconKind::Briefcase;

    pub fn name(self) -> &'static str {
        match self {
            IconKind::Briefcase => "Briefcase",
            IconKind::HeartPulse => "HeartPulse",
            IconKind::Activity => "Activity",
            IconKind::Users => "Users",
            IconKind::Stethoscope => "Stethoscope",
            IconKind::Folder => "FolderOpen",
            IconKind::Link => "Link",
            IconKind::Image => "Image",
            IconKind::Chart => "BarChart3",
        }
    }

    /// Look a registry name up, falling back to the generic icon.
    pub fn from_name(name: &str) -> IconKind {
        match name.trim() {
            "HeartPulse" => IconKind::HeartPulse,
            "Activity" => IconKind::Activity,
            "Users" => IconKind::Users,
            "Stethoscope" => IconKind::Stethoscope,
            "FolderOpen" | "Folder" => IconKind::Folder,
            "Link" => IconKind::Link,
            "Image" => IconKind::Image,
            "BarChart3" | "Chart" => IconKind::Chart,
            _ => IconKind::GENERIC,
        }
    }
}

impl Serialize for IconKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for IconKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(IconKind::from_name).unwrap_or(IconKind::GENERIC))
    }
}

/// A resolved icon ready for rendering in a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderableIcon {
    pub glyph: &'static str,
    pub label: &'static str,
}

/// Resolve a registry key to something the terminal can draw.
pub fn icon_for(kind: IconKind) -> RenderableIcon {
    let (glyph, label) = match kind {
        IconKind::Briefcase => ("💼", "briefcase"),
        IconKind::HeartPulse => ("💗", "heart pulse"),
        IconKind::Activity => ("📈", "activity"),
        IconKind::Users => ("👥", "users"),
        IconKind::Stethoscope => ("🩺", "stethoscope"),
        IconKind::Folder => ("📂", "folder"),
        IconKind::Link => ("🔗", "link"),
        IconKind::Image => ("🖼", "image"),
        IconKind::Chart => ("📊", "chart"),
    };
    RenderableIcon { glyph, label }
}

/// Available sorting options for task lists.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortKey {
    Deadline,
    Status,
    Id,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_five_collapses_into_four() {
        assert_eq!(Level::normalize(5), Level::STAFF);
        for raw in 1..=4 {
            assert_eq!(Level::normalize(raw).get() as i64, raw);
        }
    }

    #[test]
    fn missing_or_garbage_levels_become_staff() {
        assert_eq!(Level::from_optional(None), Level::STAFF);
        assert_eq!(Level::parse_lenient("abc"), Level::STAFF);
        assert_eq!(Level::parse_lenient(" 5 "), Level::STAFF);
        assert_eq!(Level::from_json(Some(&serde_json::Value::Null)), Level::STAFF);
        assert_eq!(Level::from_json(Some(&serde_json::json!("2"))), Level::MANAGER);
    }

    #[test]
    fn out_of_range_levels_are_clamped() {
        assert_eq!(Level::normalize(0), Level::OPERATOR);
        assert_eq!(Level::normalize(9), Level::STAFF);
    }

    #[test]
    fn level_deserializes_leniently() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default)]
            level: Level,
        }
        let rows: Vec<Row> =
            serde_json::from_str(r#"[{"level":5},{"level":null},{},{"level":"3"},{"level":1}]"#).unwrap();
        let levels: Vec<u8> = rows.iter().map(|r| r.level.get()).collect();
        assert_eq!(levels, vec![4, 4, 4, 3, 1]);
    }

    #[test]
    fn status_wire_names() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let parsed: Status = serde_json::from_str("\"in-progress\"").unwrap();
        assert_eq!(parsed, Status::InProgress);
        assert_eq!(Status::parse_lenient("whatever"), Status::Pending);
    }

    #[test]
    fn unknown_icon_names_fall_back_to_generic() {
        let icon: IconKind = serde_json::from_str("\"Rocket\"").unwrap();
        assert_eq!(icon, IconKind::GENERIC);
        let icon: IconKind = serde_json::from_str("\"HeartPulse\"").unwrap();
        assert_eq!(icon, IconKind::HeartPulse);
        assert_eq!(IconKind::from_name(IconKind::Folder.name()), IconKind::Folder);
    }
}
