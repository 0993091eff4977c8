//! Evidence store: pure operations over one task's evidence sequence.
//!
//! The backend has no element-level patch for arrays, so every mutation here
//! produces the complete new sequence, which the caller writes back whole.

use chrono::Utc;

use crate::error::BoardError;
use crate::fields::IconKind;
use crate::task::{Evidence, EvidenceKind};

/// Name fragments that mark a link as pointing at a directory.
pub const FOLDER_MARKERS: [&str; 2] = ["folder", "資料夾"];

/// How the presentation layer draws an evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    Stat { trending: bool },
    Link { folder: bool },
    Image,
}

impl RenderKind {
    pub fn icon(self) -> IconKind {
        match self {
            RenderKind::Stat { .. } => IconKind::Chart,
            RenderKind::Link { folder: true } => IconKind::Folder,
            RenderKind::Link { folder: false } => IconKind::Link,
            RenderKind::Image => IconKind::Image,
        }
    }
}

pub fn render_kind(item: &Evidence) -> RenderKind {
    match item {
        Evidence::Stat { trend, .. } => RenderKind::Stat {
            trending: trend.as_deref().is_some_and(|t| !t.trim().is_empty()),
        },
        Evidence::Link { name, .. } => RenderKind::Link { folder: looks_like_folder(name) },
        Evidence::Image { .. } => RenderKind::Image,
    }
}

fn looks_like_folder(name: &str) -> bool {
    let lower = name.to_lowercase();
    FOLDER_MARKERS.iter().any(|m| lower.contains(m))
}

/// Append `item`. Ids must stay unique within the sequence.
pub fn add_evidence(current: &[Evidence], item: Evidence) -> Result<Vec<Evidence>, BoardError> {
    if current.iter().any(|e| e.id() == item.id()) {
        return Err(BoardError::conflict(format!("evidence id {} already exists on this task", item.id())));
    }
    let mut next = current.to_vec();
    next.push(item);
    Ok(next)
}

/// Drop the item with `id`. Unknown ids leave the sequence unchanged.
pub fn remove_evidence(current: &[Evidence], id: &str) -> Vec<Evidence> {
    current.iter().filter(|e| e.id() != id).cloned().collect()
}

/// Millisecond timestamp id, bumped until it is unused in `current`.
pub fn new_evidence_id(current: &[Evidence]) -> String {
    let mut candidate = Utc::now().timestamp_millis();
    while current.iter().any(|e| e.id() == candidate.to_string()) {
        candidate += 1;
    }
    candidate.to_string()
}

/// User input for a new evidence item, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceDraft {
    pub kind: EvidenceKind,
    /// Stat label, or link/image name.
    pub caption: String,
    /// Stat value, or link/image URL.
    pub value: String,
    pub sub: Option<String>,
    pub trend: Option<String>,
}

impl EvidenceDraft {
    pub fn validate(&self) -> Result<(), BoardError> {
        match self.kind {
            EvidenceKind::Stat => {
                if self.caption.trim().is_empty() {
                    return Err(BoardError::validation("evidence label", "a statistic needs a label"));
                }
                if self.value.trim().is_empty() {
                    return Err(BoardError::validation("evidence value", "a statistic needs a value"));
                }
            }
            EvidenceKind::Link | EvidenceKind::Image => {
                if self.value.trim().is_empty() {
                    return Err(BoardError::validation("evidence url", "links and images need a URL"));
                }
            }
        }
        Ok(())
    }

    pub fn into_evidence(self, id: String) -> Evidence {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        match self.kind {
            EvidenceKind::Stat => Evidence::Stat {
                id,
                label: self.caption,
                value: self.value,
                sub: non_empty(self.sub),
                trend: non_empty(self.trend),
            },
            EvidenceKind::Link => Evidence::Link {
                id,
                name: if self.caption.trim().is_empty() { self.value.clone() } else { self.caption },
                url: self.value,
            },
            EvidenceKind::Image => Evidence::Image {
                id,
                name: if self.caption.trim().is_empty() { "image".into() } else { self.caption },
                url: self.value,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use assert_matches::assert_matches;

    fn link(id: &str, name: &str) -> Evidence {
        Evidence::Link { id: id.into(), name: name.into(), url: "https://share.example/x".into() }
    }

    fn stat(id: &str, trend: Option<&str>) -> Evidence {
        Evidence::Stat {
            id: id.into(),
            label: "Completion".into(),
            value: "85".into(),
            sub: Some("%".into()),
            trend: trend.map(String::from),
        }
    }

    fn ids(seq: &[Evidence]) -> HashSet<String> {
        seq.iter().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn add_then_remove_restores_the_original_set() {
        let original = vec![stat("1", None), link("2", "Minutes")];
        let added = add_evidence(&original, link("3", "Photos")).unwrap();
        assert_eq!(added.len(), 3);
        assert_eq!(added[2].id(), "3");
        let removed = remove_evidence(&added, "3");
        assert_eq!(ids(&removed), ids(&original));
        assert_eq!(removed, original);
    }

    #[test]
    fn removing_an_unknown_id_is_a_no_op() {
        let original = vec![stat("1", None), link("2", "Minutes")];
        let after = remove_evidence(&original, "999");
        assert_eq!(after.len(), original.len());
        assert_eq!(after, original);
        assert!(remove_evidence(&[], "1").is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let original = vec![stat("1", None)];
        assert_matches!(add_evidence(&original, link("1", "Dup")), Err(BoardError::Conflict(_)));
    }

    #[test]
    fn render_kind_dispatch() {
        assert_eq!(render_kind(&stat("1", Some("up"))), RenderKind::Stat { trending: true });
        assert_eq!(render_kind(&stat("1", Some(""))), RenderKind::Stat { trending: false });
        assert_eq!(render_kind(&link("1", "Shared Folder")), RenderKind::Link { folder: true });
        assert_eq!(render_kind(&link("1", "成果資料夾")), RenderKind::Link { folder: true });
        assert_eq!(render_kind(&link("1", "Report")), RenderKind::Link { folder: false });
        let image = Evidence::Image { id: "4".into(), name: "Before".into(), url: "u".into() };
        assert_eq!(render_kind(&image), RenderKind::Image);
        assert_eq!(RenderKind::Link { folder: true }.icon(), IconKind::Folder);
    }

    #[test]
    fn new_ids_avoid_collisions() {
        let first = new_evidence_id(&[]);
        let seq = vec![link(&first, "a")];
        let second = new_evidence_id(&seq);
        assert_ne!(first, second);
    }

    #[test]
    fn drafts_validate_per_kind() {
        let draft = EvidenceDraft {
            kind: EvidenceKind::Stat,
            caption: "Falls".into(),
            value: "".into(),
            sub: None,
            trend: None,
        };
        assert_matches!(draft.validate(), Err(BoardError::Validation { field: "evidence value", .. }));

        let draft = EvidenceDraft { kind: EvidenceKind::Link, caption: "".into(), value: "https://x".into(), ..draft };
        assert!(draft.validate().is_ok());
        assert_matches!(draft.into_evidence("9".into()), Evidence::Link { name, .. } if name == "https://x");
    }
}
