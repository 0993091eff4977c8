//! Role and level hierarchy resolution.
//!
//! Roles come from three sources: the built-in defaults, the local custom-role
//! cache and bare identifiers seen on user records. They are merged in that
//! order, first writer wins, and identifiers that only appear on users become
//! [`Role::Synthesized`] placeholders.
//!
//! Picking a user is a two-stage filter: a level must be chosen first, then an
//! optional role narrows the candidates further. The hidden legacy role never
//! shows up in any picker or count.

use std::collections::{BTreeMap, HashSet};

use crate::error::BoardError;
use crate::fields::Level;
use crate::role::{is_hidden_role, Role, RoleRecord};
use crate::task::Task;
use crate::user::User;

/// Merged, de-duplicated view over every known role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet {
    roles: Vec<Role>,
}

impl RoleSet {
    /// Merge the three role sources. Earlier sources win on id collisions.
    pub fn merge<'a>(
        builtin: impl IntoIterator<Item = RoleRecord>,
        custom: impl IntoIterator<Item = RoleRecord>,
        observed: impl IntoIterator<Item = &'a str>,
    ) -> RoleSet {
        let mut seen: HashSet<String> = HashSet::new();
        let mut roles = Vec::new();
        for record in builtin.into_iter().chain(custom) {
            if record.id.trim().is_empty() || !seen.insert(record.id.clone()) {
                continue;
            }
            roles.push(Role::Known(record));
        }
        for id in observed {
            let id = id.trim();
            if id.is_empty() || !seen.insert(id.to_string()) {
                continue;
            }
            tracing::debug!(role = id, "synthesizing placeholder role");
            roles.push(Role::Synthesized(id.to_string()));
        }
        RoleSet { roles }
    }

    pub fn all(&self) -> &[Role] {
        &self.roles
    }

    pub fn get(&self, id: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.id() == id)
    }

    /// Resolve any identifier, synthesizing a placeholder for unknown ones.
    pub fn resolve(&self, id: &str) -> Role {
        self.get(id).cloned().unwrap_or_else(|| Role::Synthesized(id.to_string()))
    }

    /// Roles offered in pickers and tabs.
    pub fn visible(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter().filter(|r| !is_hidden_role(r.id()))
    }

    /// Default level a new user with `role_id` gets.
    pub fn default_level(&self, role_id: &str) -> Level {
        self.get(role_id).map(Role::level).unwrap_or(Level::STAFF)
    }

    /// Display name for `role_id`, or the id itself.
    pub fn display_name(&self, role_id: &str) -> String {
        self.get(role_id).map(|r| r.name().to_string()).unwrap_or_else(|| role_id.to_string())
    }
}

/// Distinct role identifiers referenced by users, in first-seen order.
pub fn observed_role_ids(users: &[User]) -> Vec<String> {
    let mut seen = HashSet::new();
    users
        .iter()
        .map(User::role_id)
        .filter(|r| !r.is_empty() && seen.insert(r.to_string()))
        .map(String::from)
        .collect()
}

/// Users eligible for any picker.
pub fn selectable_users(users: &[User]) -> impl Iterator<Item = &User> {
    users.iter().filter(|u| !is_hidden_role(u.role_id()))
}

/// Two-stage level then role filter over a user population.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPicker {
    level: Option<Level>,
    role: Option<String>,
}

impl UserPicker {
    pub fn new() -> Self {
        UserPicker::default()
    }

    pub fn level(&self) -> Option<Level> {
        self.level
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Choosing a level resets any role choice.
    pub fn select_level(&mut self, level: Level) {
        self.level = Some(level);
        self.role = None;
    }

    pub fn select_role(&mut self, role: impl Into<String>) -> Result<(), BoardError> {
        if self.level.is_none() {
            return Err(BoardError::validation("level", "choose a level before a role"));
        }
        let role = role.into().trim().to_string();
        if is_hidden_role(&role) {
            return Err(BoardError::validation("role", format!("role {role} cannot be picked")));
        }
        self.role = Some(role);
        Ok(())
    }

    /// Back to "all roles at this level".
    pub fn clear_role(&mut self) {
        self.role = None;
    }

    /// Back to no selection at all.
    pub fn reset(&mut self) {
        self.level = None;
        self.role = None;
    }

    /// Users matching the current selection. Empty until a level is chosen.
    pub fn candidates<'a>(&self, users: &'a [User]) -> Vec<&'a User> {
        let Some(level) = self.level else {
            return Vec::new();
        };
        selectable_users(users)
            .filter(|u| u.level == level)
            .filter(|u| self.role.as_deref().map_or(true, |r| u.role_id() == r))
            .collect()
    }

    /// Roles present at the chosen level with how many users hold each.
    pub fn roles_at_level(&self, users: &[User]) -> Vec<(String, usize)> {
        let Some(level) = self.level else {
            return Vec::new();
        };
        let mut counts: Vec<(String, usize)> = Vec::new();
        for user in selectable_users(users).filter(|u| u.level == level) {
            match counts.iter_mut().find(|(r, _)| r == user.role_id()) {
                Some((_, n)) => *n += 1,
                None => counts.push((user.role_id().to_string(), 1)),
            }
        }
        counts
    }

    /// Pick a user by id from the current candidates.
    pub fn pick<'a>(&self, users: &'a [User], user_id: u64) -> Result<&'a User, BoardError> {
        if self.level.is_none() {
            return Err(BoardError::validation("level", "choose a level before a person"));
        }
        self.candidates(users)
            .into_iter()
            .find(|u| u.id == user_id)
            .ok_or_else(|| BoardError::validation("user", format!("user {user_id} is not in the current selection")))
    }
}

/// Head count per level, hidden role excluded. Every level is present.
pub fn level_counts(users: &[User]) -> BTreeMap<Level, usize> {
    let mut counts: BTreeMap<Level, usize> = Level::ALL.iter().map(|l| (*l, 0)).collect();
    for user in selectable_users(users) {
        *counts.entry(user.level).or_insert(0) += 1;
    }
    counts
}

/// Head count per role id, hidden role excluded.
pub fn role_counts(users: &[User]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for user in selectable_users(users) {
        *counts.entry(user.role_id().to_string()).or_insert(0) += 1;
    }
    counts
}

/// Both preconditions of a role delete, checked before anything is mutated.
pub fn check_role_deletable(role_id: &str, roles: &RoleSet, users: &[User]) -> Result<(), BoardError> {
    let role_id = role_id.trim();
    if roles.get(role_id).is_some_and(Role::is_default) || crate::role::is_builtin(role_id) {
        return Err(BoardError::conflict(format!("role {role_id} is built in and cannot be deleted")));
    }
    let holders = users.iter().filter(|u| u.role_id() == role_id).count();
    if holders > 0 {
        return Err(BoardError::conflict(format!(
            "role {role_id} is still held by {holders} user(s)"
        )));
    }
    Ok(())
}

/// A user can be deleted only when no task refers to them.
pub fn check_user_deletable(user_id: u64, tasks: &[Task]) -> Result<(), BoardError> {
    let refs: Vec<u64> = tasks.iter().filter(|t| t.references_user(user_id)).map(|t| t.id).collect();
    if refs.is_empty() {
        Ok(())
    } else {
        Err(BoardError::conflict(format!(
            "user {user_id} is referenced by {} task(s): {}",
            refs.len(),
            refs.iter().map(u64::to_string).collect::<Vec<_>>().join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::{builtin_roles, RoleDraft};
    use crate::task::{TaskDates, TaskDraft};
    use assert_matches::assert_matches;

    fn user(id: u64, role: &str, level: i64) -> User {
        User {
            id,
            name: format!("user-{id}"),
            role: role.into(),
            level: Level::normalize(level),
            mail: None,
            employee_id: None,
            avatar: None,
        }
    }

    fn population() -> Vec<User> {
        vec![
            user(1, "medical_admin", 1),
            user(2, "nurse", 3),
            user(3, "nurse", 4),
            user(4, "ot", 4),
            user(5, "OT", 3),
            user(6, "ward_ops", 5),
            user(7, "pharmacist", 4),
            user(8, "nurse", 4),
        ]
    }

    fn custom(id: &str) -> RoleRecord {
        RoleDraft { id: id.into(), name: format!("{id} team"), ..RoleDraft::default() }.into_record()
    }

    #[test]
    fn merge_prefers_earlier_sources() {
        let mut shadow = custom("nurse");
        shadow.name = "Shadow".into();
        let set = RoleSet::merge(builtin_roles(), vec![shadow, custom("pharmacist")], ["pharmacist", "porter", "nurse"]);

        assert_eq!(set.get("nurse").unwrap().name(), "護理師");
        assert!(set.get("pharmacist").is_some_and(|r| !r.is_synthesized()));
        assert_eq!(set.get("porter"), Some(&Role::Synthesized("porter".into())));
        let ids: Vec<&str> = set.all().iter().map(Role::id).collect();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn resolve_falls_back_to_placeholder() {
        let set = RoleSet::merge(builtin_roles(), vec![], []);
        let role = set.resolve("unknown");
        assert!(role.is_synthesized());
        assert_eq!(role.level(), Level::STAFF);
        assert_eq!(set.default_level("unknown"), Level::STAFF);
        assert!(set.visible().all(|r| r.id() != "ot"));
    }

    #[test]
    fn level_then_role_filter() {
        let users = population();
        let mut picker = UserPicker::new();
        assert!(picker.candidates(&users).is_empty());

        picker.select_level(Level::STAFF);
        let at_four: Vec<u64> = picker.candidates(&users).iter().map(|u| u.id).collect();
        assert_eq!(at_four, vec![3, 6, 7, 8]);

        picker.select_role("nurse").unwrap();
        let nurses: Vec<u64> = picker.candidates(&users).iter().map(|u| u.id).collect();
        assert_eq!(nurses, vec![3, 8]);

        picker.clear_role();
        assert_eq!(picker.candidates(&users).len(), 4);
    }

    #[test]
    fn filter_matches_set_definition_for_every_pair() {
        let users = population();
        for level in Level::ALL {
            for role in ["medical_admin", "nurse", "ward_ops", "pharmacist"] {
                let mut picker = UserPicker::new();
                picker.select_level(level);
                picker.select_role(role).unwrap();
                let got: Vec<u64> = picker.candidates(&users).iter().map(|u| u.id).collect();
                let want: Vec<u64> =
                    users.iter().filter(|u| u.level == level && u.role == role).map(|u| u.id).collect();
                assert_eq!(got, want);
            }
            let mut picker = UserPicker::new();
            picker.select_level(level);
            assert!(picker.candidates(&users).iter().all(|u| !is_hidden_role(&u.role)));
            assert!(picker.roles_at_level(&users).iter().all(|(r, _)| !is_hidden_role(r)));
        }
    }

    #[test]
    fn role_needs_level_and_hidden_role_is_refused() {
        let mut picker = UserPicker::new();
        assert_matches!(picker.select_role("nurse"), Err(BoardError::Validation { field: "level", .. }));
        picker.select_level(Level::SUPERVISOR);
        assert_matches!(picker.select_role("Ot"), Err(BoardError::Validation { field: "role", .. }));
    }

    #[test]
    fn changing_level_clears_role() {
        let mut picker = UserPicker::new();
        picker.select_level(Level::SUPERVISOR);
        picker.select_role("nurse").unwrap();
        picker.select_level(Level::STAFF);
        assert_eq!(picker.role(), None);
    }

    #[test]
    fn pick_only_from_candidates() {
        let users = population();
        let mut picker = UserPicker::new();
        assert_matches!(picker.pick(&users, 2), Err(BoardError::Validation { field: "level", .. }));
        picker.select_level(Level::SUPERVISOR);
        assert_eq!(picker.pick(&users, 2).unwrap().id, 2);
        assert!(picker.pick(&users, 5).is_err());
        assert!(picker.pick(&users, 1).is_err());
    }

    #[test]
    fn counts_skip_hidden_role() {
        let users = population();
        let levels = level_counts(&users);
        assert_eq!(levels[&Level::OPERATOR], 1);
        assert_eq!(levels[&Level::MANAGER], 0);
        assert_eq!(levels[&Level::SUPERVISOR], 1);
        assert_eq!(levels[&Level::STAFF], 4);
        let roles = role_counts(&users);
        assert_eq!(roles["nurse"], 3);
        assert!(!roles.contains_key("ot") && !roles.contains_key("OT"));
    }

    #[test]
    fn role_deletion_guard() {
        let users = population();
        let set = RoleSet::merge(builtin_roles(), vec![custom("pharmacist"), custom("porter")], []);
        assert_matches!(check_role_deletable("nurse", &set, &users), Err(BoardError::Conflict(_)));
        assert_matches!(check_role_deletable("ot", &set, &[]), Err(BoardError::Conflict(_)));
        assert_matches!(check_role_deletable("pharmacist", &set, &users), Err(BoardError::Conflict(_)));
        assert!(check_role_deletable("porter", &set, &users).is_ok());
    }

    #[test]
    fn padded_role_ids_match_everywhere() {
        let users = vec![user(1, " porter", 4), user(2, "porter ", 4), user(3, " OT ", 4)];
        let set = RoleSet::merge(builtin_roles(), vec![custom("porter")], []);
        assert_eq!(observed_role_ids(&users), vec!["porter", "OT"]);
        assert_matches!(check_role_deletable("porter", &set, &users), Err(BoardError::Conflict(_)));

        let mut picker = UserPicker::new();
        picker.select_level(Level::STAFF);
        assert_eq!(picker.roles_at_level(&users), vec![("porter".to_string(), 2)]);
        picker.select_role(" porter").unwrap();
        let ids: Vec<u64> = picker.candidates(&users).iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(role_counts(&users).get("porter"), Some(&2));
    }

    #[test]
    fn user_deletion_guard() {
        let mut task = Task::from_draft(
            10,
            TaskDraft {
                title: "Audit".into(),
                assignee_id: Some(2),
                dates: TaskDates::default(),
                ..TaskDraft::default()
            },
        );
        task.collaborator_ids.insert(7);
        let tasks = vec![task];
        assert_matches!(check_user_deletable(2, &tasks), Err(BoardError::Conflict(_)));
        assert_matches!(check_user_deletable(7, &tasks), Err(BoardError::Conflict(_)));
        assert!(check_user_deletable(3, &tasks).is_ok());
    }

    #[test]
    fn observed_ids_are_distinct() {
        let ids = observed_role_ids(&population());
        assert_eq!(ids, vec!["medical_admin", "nurse", "ot", "OT", "ward_ops", "pharmacist"]);
    }
}
