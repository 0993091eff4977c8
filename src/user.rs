//! Users (employees) and the draft used to create them.

use serde::{Deserialize, Serialize};

use crate::error::BoardError;
use crate::fields::Level;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub name: String,
    /// Role identifier. May name a role that is not in the loaded role set.
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl User {
    /// Build a user from a validated draft. `role_level` is the default level of
    /// the draft's role, used when the draft leaves the level open.
    pub fn from_draft(id: u64, draft: UserDraft, role_level: Level) -> User {
        User {
            id,
            name: draft.name.trim().to_string(),
            role: draft.role.trim().to_string(),
            level: draft.level.unwrap_or(role_level),
            mail: draft.mail.filter(|s| !s.trim().is_empty()),
            employee_id: draft.employee_id.filter(|s| !s.trim().is_empty()),
            avatar: draft.avatar,
        }
    }

    /// Role identifier with stray whitespace removed.
    pub fn role_id(&self) -> &str {
        self.role.trim()
    }

    /// Avatar glyph, or the first character of the name.
    pub fn badge(&self) -> String {
        match &self.avatar {
            Some(a) if !a.is_empty() => a.clone(),
            _ => self.name.chars().next().map(String::from).unwrap_or_else(|| "?".into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDraft {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl UserDraft {
    pub fn validate(&self) -> Result<(), BoardError> {
        if self.name.trim().is_empty() {
            return Err(BoardError::validation("name", "a user needs a name"));
        }
        if self.role.trim().is_empty() {
            return Err(BoardError::validation("role", "a user needs a role"));
        }
        Ok(())
    }
}

/// Built-in roster shown when the user list cannot be loaded.
pub fn sample_roster() -> Vec<User> {
    let rows = [
        (1, "陳主任", "medical_admin", "👨‍⚕️"),
        (2, "林護理長", "nurse", "👩‍⚕️"),
        (3, "張社工", "social_worker", "🧑‍💼"),
        (4, "王治療師", "ot", "🧘"),
        (5, "李專員", "ward_ops", "👨‍💼"),
        (6, "吳協調員", "medical_admin", "👩‍💼"),
    ];
    rows.into_iter()
        .map(|(id, name, role, avatar)| User {
            id,
            name: name.into(),
            role: role.into(),
            level: Level::STAFF,
            mail: None,
            employee_id: None,
            avatar: Some(avatar.into()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn draft_requires_name_and_role() {
        let draft = UserDraft { name: "Nurse Kao".into(), role: "nurse".into(), ..UserDraft::default() };
        assert!(draft.validate().is_ok());
        assert_matches!(
            UserDraft { name: " ".into(), ..draft.clone() }.validate(),
            Err(BoardError::Validation { field: "name", .. })
        );
        assert_matches!(
            UserDraft { role: "".into(), ..draft }.validate(),
            Err(BoardError::Validation { field: "role", .. })
        );
    }

    #[test]
    fn level_defaults_to_role_level() {
        let draft = UserDraft { name: "Kao".into(), role: "nurse".into(), ..UserDraft::default() };
        assert_eq!(User::from_draft(1, draft.clone(), Level::SUPERVISOR).level, Level::SUPERVISOR);
        let draft = UserDraft { level: Some(Level::MANAGER), ..draft };
        assert_eq!(User::from_draft(1, draft, Level::SUPERVISOR).level, Level::MANAGER);
    }

    #[test]
    fn legacy_level_five_reads_as_staff() {
        let user: User = serde_json::from_str(r#"{"id": 3, "name": "Lin", "role": "nurse", "level": 5}"#).unwrap();
        assert_eq!(user.level, Level::STAFF);
        let user: User = serde_json::from_str(r#"{"id": 3, "name": "Lin", "role": "nurse"}"#).unwrap();
        assert_eq!(user.level, Level::STAFF);
    }

    #[test]
    fn badge_falls_back_to_initial() {
        let mut user = sample_roster().remove(0);
        assert_eq!(user.badge(), "👨‍⚕️");
        user.avatar = None;
        assert_eq!(user.badge(), "陳");
    }
}
