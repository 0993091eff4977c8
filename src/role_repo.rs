//! Local key-value store holding the administrator-created roles.
//!
//! The store is a small JSON object on disk. Custom roles live under a single
//! fixed key as an array of `{id, name, iconName, color, level}`; other keys in
//! the file are left untouched. The repository is loaded once at startup and
//! flushed after every mutating role operation.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fields::{IconKind, Level};
use crate::role::RoleRecord;

/// Key under which custom roles are stored.
pub const CUSTOM_ROLES_KEY: &str = "wardboard.customRoles";

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a valid key-value store: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Serialized shape of one cached role. Icons are stored by registry name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedRole {
    id: String,
    name: String,
    #[serde(default)]
    icon_name: IconKind,
    #[serde(default)]
    color: String,
    #[serde(default)]
    level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    webhook: Option<String>,
}

impl From<&RoleRecord> for CachedRole {
    fn from(r: &RoleRecord) -> Self {
        CachedRole {
            id: r.id.clone(),
            name: r.name.clone(),
            icon_name: r.icon,
            color: r.color.clone(),
            level: r.level,
            webhook: r.webhook.clone(),
        }
    }
}

impl From<CachedRole> for RoleRecord {
    fn from(c: CachedRole) -> Self {
        RoleRecord {
            id: c.id,
            name: c.name,
            icon: c.icon_name,
            color: c.color,
            level: c.level,
            is_default: false,
            webhook: c.webhook,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleRepository {
    path: Option<PathBuf>,
    roles: Vec<RoleRecord>,
}

impl RoleRepository {
    /// Repository that never touches the disk.
    pub fn in_memory() -> Self {
        RoleRepository::default()
    }

    /// Load custom roles from `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let path = path.into();
        let store = read_store(&path)?;
        let roles = match store.get(CUSTOM_ROLES_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match serde_json::from_value::<CachedRole>(item.clone()) {
                    Ok(role) => Some(RoleRecord::from(role)),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unreadable cached role");
                        None
                    }
                })
                .collect(),
            Some(other) => {
                tracing::warn!(found = %other, "custom role cache is not an array; ignoring it");
                Vec::new()
            }
            None => Vec::new(),
        };
        tracing::debug!(path = %path.display(), count = roles.len(), "loaded custom roles");
        Ok(RoleRepository { path: Some(path), roles })
    }

    pub fn roles(&self) -> &[RoleRecord] {
        &self.roles
    }

    /// Replace the cached roles and flush them to disk.
    pub fn save(&mut self, roles: Vec<RoleRecord>) -> Result<(), RepoError> {
        if let Some(path) = &self.path {
            let mut store = read_store(path)?;
            let cached: Vec<CachedRole> = roles.iter().map(CachedRole::from).collect();
            let value = serde_json::to_value(cached).map_err(|source| RepoError::Parse {
                path: path.clone(),
                source,
            })?;
            store.insert(CUSTOM_ROLES_KEY.to_string(), value);
            write_store(path, &store)?;
        }
        self.roles = roles;
        Ok(())
    }
}

fn read_store(path: &Path) -> Result<Map<String, Value>, RepoError> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let buf = fs::read_to_string(path).map_err(|source| RepoError::Io { path: path.to_path_buf(), source })?;
    if buf.trim().is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(&buf).map_err(|source| RepoError::Parse { path: path.to_path_buf(), source })
}

fn write_store(path: &Path, store: &Map<String, Value>) -> Result<(), RepoError> {
    let io_err = |source| RepoError::Io { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let data = serde_json::to_string_pretty(store)
        .map_err(|source| RepoError::Parse { path: path.to_path_buf(), source })?;
    // Temp file + rename so a crash never leaves a half-written store.
    let tmp = path.with_extension("json.tmp");
    let mut f = File::create(&tmp).map_err(io_err)?;
    f.write_all(data.as_bytes()).map_err(io_err)?;
    f.flush().map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::RoleDraft;
    use assert_matches::assert_matches;

    fn pharmacist() -> RoleRecord {
        RoleDraft {
            id: "pharmacist".into(),
            name: "Pharmacy".into(),
            icon: Some(IconKind::HeartPulse),
            level: Some(Level::SUPERVISOR),
            ..RoleDraft::default()
        }
        .into_record()
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = RoleRepository::load(dir.path().join("store.json")).unwrap();
        assert!(repo.roles().is_empty());
    }

    #[test]
    fn save_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut repo = RoleRepository::load(&path).unwrap();
        repo.save(vec![pharmacist()]).unwrap();

        let reloaded = RoleRepository::load(&path).unwrap();
        assert_eq!(reloaded.roles(), &[pharmacist()]);

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &raw[CUSTOM_ROLES_KEY][0];
        assert_eq!(entry["iconName"], "HeartPulse");
        assert_eq!(entry["level"], 3);
        assert!(entry.get("isDefault").is_none());
    }

    #[test]
    fn other_keys_survive_a_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{"theme": "dark"}"#).unwrap();
        let mut repo = RoleRepository::load(&path).unwrap();
        repo.save(vec![pharmacist()]).unwrap();
        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
    }

    #[test]
    fn legacy_levels_and_bad_entries_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(
            &path,
            r#"{"wardboard.customRoles": [
                {"id": "porter", "name": "Porter", "iconName": "Unknown", "color": "x", "level": 5},
                {"name": "no id"}
            ]}"#,
        )
        .unwrap();
        let repo = RoleRepository::load(&path).unwrap();
        assert_eq!(repo.roles().len(), 1);
        assert_eq!(repo.roles()[0].level, Level::STAFF);
        assert_eq!(repo.roles()[0].icon, IconKind::GENERIC);
    }

    #[test]
    fn corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();
        assert_matches!(RoleRepository::load(&path), Err(RepoError::Parse { .. }));
    }

    #[test]
    fn in_memory_repo_keeps_roles() {
        let mut repo = RoleRepository::in_memory();
        repo.save(vec![pharmacist()]).unwrap();
        assert_eq!(repo.roles().len(), 1);
    }
}
