//! Roles: built-in defaults, administrator-created records and placeholders
//! synthesized for identifiers that only appear on user records.

use serde::{Deserialize, Serialize};

use crate::error::BoardError;
use crate::fields::{IconKind, Level};

/// Color hint given to placeholder roles.
pub const NEUTRAL_COLOR: &str = "bg-gray-100 text-gray-700";

/// Color hint given to roles created without one.
pub const DEFAULT_COLOR: &str = "bg-blue-100 text-blue-700";

/// Legacy role kept in data but hidden from every picker and count.
pub const HIDDEN_ROLE: &str = "ot";

pub fn is_hidden_role(id: &str) -> bool {
    id.trim().eq_ignore_ascii_case(HIDDEN_ROLE)
}

/// A role somebody actually defined, either shipped or created by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "iconName", alias = "icon_name", alias = "icon", default)]
    pub icon: IconKind,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub level: Level,
    #[serde(default, alias = "is_default")]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
}

/// A role as shown to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Known(RoleRecord),
    /// Only the identifier is known, taken from a user record.
    Synthesized(String),
}

impl Role {
    pub fn id(&self) -> &str {
        match self {
            Role::Known(r) => &r.id,
            Role::Synthesized(id) => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Role::Known(r) => &r.name,
            Role::Synthesized(id) => id,
        }
    }

    pub fn icon(&self) -> IconKind {
        match self {
            Role::Known(r) => r.icon,
            Role::Synthesized(_) => IconKind::GENERIC,
        }
    }

    pub fn color(&self) -> &str {
        match self {
            Role::Known(r) => &r.color,
            Role::Synthesized(_) => NEUTRAL_COLOR,
        }
    }

    pub fn level(&self) -> Level {
        match self {
            Role::Known(r) => r.level,
            Role::Synthesized(_) => Level::STAFF,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Role::Known(r) if r.is_default)
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, Role::Synthesized(_))
    }

    /// Materialize as a record, filling placeholder metadata for synthesized roles.
    pub fn to_record(&self) -> RoleRecord {
        match self {
            Role::Known(r) => r.clone(),
            Role::Synthesized(id) => placeholder_record(id),
        }
    }
}

/// Record with the metadata a synthesized role displays with.
pub fn placeholder_record(id: &str) -> RoleRecord {
    RoleRecord {
        id: id.to_string(),
        name: id.to_string(),
        icon: IconKind::GENERIC,
        color: NEUTRAL_COLOR.to_string(),
        level: Level::STAFF,
        is_default: false,
        webhook: None,
    }
}

/// Roles that ship with the board. They cannot be renamed or deleted.
pub fn builtin_roles() -> Vec<RoleRecord> {
    let rows = [
        ("medical_admin", "醫務專員", IconKind::Briefcase, "bg-blue-100 text-blue-700"),
        ("nurse", "護理師", IconKind::HeartPulse, "bg-pink-100 text-pink-700"),
        ("ward_ops", "病房業務", IconKind::Activity, "bg-green-100 text-green-700"),
        ("social_worker", "社工師", IconKind::Users, "bg-orange-100 text-orange-700"),
        (HIDDEN_ROLE, "職能治療師", IconKind::Stethoscope, "bg-purple-100 text-purple-700"),
    ];
    rows.into_iter()
        .map(|(id, name, icon, color)| RoleRecord {
            id: id.into(),
            name: name.into(),
            icon,
            color: color.into(),
            level: Level::STAFF,
            is_default: true,
            webhook: None,
        })
        .collect()
}

pub fn is_builtin(id: &str) -> bool {
    builtin_roles().iter().any(|r| r.id == id)
}

/// Input for creating or editing a role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDraft {
    pub id: String,
    pub name: String,
    pub icon: Option<IconKind>,
    pub color: Option<String>,
    pub level: Option<Level>,
    pub webhook: Option<String>,
}

impl RoleDraft {
    pub fn validate(&self) -> Result<(), BoardError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(BoardError::validation("role id", "a role needs an id"));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(BoardError::validation("role id", "role ids cannot contain spaces"));
        }
        if self.name.trim().is_empty() {
            return Err(BoardError::validation("role name", "a role needs a name"));
        }
        Ok(())
    }

    pub fn into_record(self) -> RoleRecord {
        RoleRecord {
            id: self.id.trim().to_string(),
            name: self.name.trim().to_string(),
            icon: self.icon.unwrap_or(IconKind::GENERIC),
            color: self.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            level: self.level.unwrap_or(Level::STAFF),
            is_default: false,
            webhook: self.webhook.filter(|w| !w.trim().is_empty()),
        }
    }

    /// Apply the draft to an existing record. The id never changes.
    pub fn apply_to(self, record: &mut RoleRecord) {
        record.name = self.name.trim().to_string();
        if let Some(icon) = self.icon {
            record.icon = icon;
        }
        if let Some(color) = self.color {
            record.color = color;
        }
        if let Some(level) = self.level {
            record.level = level;
        }
        if self.webhook.is_some() {
            record.webhook = self.webhook.filter(|w| !w.trim().is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn hidden_role_match_ignores_case() {
        assert!(is_hidden_role("ot"));
        assert!(is_hidden_role("OT"));
        assert!(is_hidden_role(" Ot "));
        assert!(!is_hidden_role("ot_assistant"));
    }

    #[test]
    fn synthesized_roles_use_placeholder_metadata() {
        let role = Role::Synthesized("pharmacist".into());
        assert_eq!(role.name(), "pharmacist");
        assert_eq!(role.icon(), IconKind::GENERIC);
        assert_eq!(role.color(), NEUTRAL_COLOR);
        assert_eq!(role.level(), Level::STAFF);
        assert!(!role.is_default());
        assert_eq!(role.to_record(), placeholder_record("pharmacist"));
    }

    #[test]
    fn builtins_are_default() {
        assert!(builtin_roles().iter().all(|r| r.is_default));
        assert!(is_builtin("nurse"));
        assert!(!is_builtin("pharmacist"));
    }

    #[test]
    fn record_reads_import_and_cache_shapes() {
        let cached: RoleRecord = serde_json::from_str(
            r#"{"id":"pharm","name":"Pharmacy","iconName":"HeartPulse","color":"c","level":5}"#,
        )
        .unwrap();
        assert_eq!(cached.icon, IconKind::HeartPulse);
        assert_eq!(cached.level, Level::STAFF);
        assert!(!cached.is_default);

        let row: RoleRecord = serde_json::from_str(
            r#"{"id":"pharm","name":"Pharmacy","icon_name":"Nope","level":null,"is_default":true}"#,
        )
        .unwrap();
        assert_eq!(row.icon, IconKind::GENERIC);
        assert!(row.is_default);
    }

    #[test]
    fn draft_validation_and_edit() {
        assert_matches!(
            RoleDraft { id: "".into(), name: "x".into(), ..RoleDraft::default() }.validate(),
            Err(BoardError::Validation { field: "role id", .. })
        );
        assert_matches!(
            RoleDraft { id: "x".into(), name: " ".into(), ..RoleDraft::default() }.validate(),
            Err(BoardError::Validation { field: "role name", .. })
        );

        let mut record = RoleDraft { id: "pharm".into(), name: "Pharmacy".into(), ..RoleDraft::default() }
            .into_record();
        assert_eq!(record.color, DEFAULT_COLOR);
        RoleDraft { id: "other".into(), name: "Pharmacy team".into(), level: Some(Level::MANAGER), ..RoleDraft::default() }
            .apply_to(&mut record);
        assert_eq!(record.id, "pharm");
        assert_eq!(record.name, "Pharmacy team");
        assert_eq!(record.level, Level::MANAGER);
    }
}
