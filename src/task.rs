//! Task and evidence data structures.
//!
//! A `Task` is assigned from one user to another, carries three milestone dates
//! and owns an ordered list of `Evidence` items proving the work was done.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::dates::parse_stored_date;
use crate::error::BoardError;
use crate::fields::Status;

/// The three calendar milestones of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDates {
    #[serde(default, deserialize_with = "de_opt_date")]
    pub plan: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub interim: Option<NaiveDate>,
    #[serde(rename = "final", default, deserialize_with = "de_opt_date")]
    pub final_date: Option<NaiveDate>,
}

/// A unit of work handed from an assigner to an assignee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assigner_id: Option<u64>,
    #[serde(default)]
    pub assignee_id: Option<u64>,
    #[serde(default)]
    pub collaborator_ids: BTreeSet<u64>,
    #[serde(default)]
    pub role_category: String,
    #[serde(default)]
    pub dates: TaskDates,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub assignee_response: Option<String>,
    #[serde(default, deserialize_with = "de_null_as_empty")]
    pub evidence: Vec<Evidence>,
}

impl Task {
    /// Build a freshly created task: pending, no response, no evidence.
    pub fn from_draft(id: u64, draft: TaskDraft) -> Task {
        Task {
            id,
            title: draft.title.trim().to_string(),
            description: draft.description,
            assigner_id: draft.assigner_id,
            assignee_id: draft.assignee_id,
            collaborator_ids: draft.collaborator_ids,
            role_category: draft.role_category,
            dates: draft.dates,
            status: Status::Pending,
            assignee_response: None,
            evidence: Vec::new(),
        }
    }

    /// Whether `user_id` appears anywhere on the task.
    pub fn references_user(&self, user_id: u64) -> bool {
        self.assigner_id == Some(user_id)
            || self.assignee_id == Some(user_id)
            || self.collaborator_ids.contains(&user_id)
    }
}

/// Input for task creation. Id, status and evidence are assigned on create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assigner_id: Option<u64>,
    #[serde(default)]
    pub assignee_id: Option<u64>,
    #[serde(default)]
    pub collaborator_ids: BTreeSet<u64>,
    #[serde(default)]
    pub role_category: String,
    #[serde(default)]
    pub dates: TaskDates,
}

impl TaskDraft {
    /// Title, assignee and final deadline are mandatory.
    pub fn validate(&self) -> Result<(), BoardError> {
        if self.title.trim().is_empty() {
            return Err(BoardError::validation("title", "a task needs a title"));
        }
        if self.assignee_id.is_none() {
            return Err(BoardError::validation("assignee", "a task needs an assignee"));
        }
        if self.dates.final_date.is_none() {
            return Err(BoardError::validation("final date", "a task needs a final deadline"));
        }
        Ok(())
    }
}

/// Evidence variants, used for dispatch and for the `--kind` CLI switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EvidenceKind {
    Stat,
    Link,
    Image,
}

/// A result artifact attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Evidence {
    Stat {
        #[serde(deserialize_with = "de_string_or_number")]
        id: String,
        #[serde(default)]
        label: String,
        #[serde(default)]
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sub: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trend: Option<String>,
    },
    Link {
        #[serde(deserialize_with = "de_string_or_number")]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        url: String,
    },
    Image {
        #[serde(deserialize_with = "de_string_or_number")]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        url: String,
    },
}

impl Evidence {
    pub fn id(&self) -> &str {
        match self {
            Evidence::Stat { id, .. } | Evidence::Link { id, .. } | Evidence::Image { id, .. } => id,
        }
    }

    pub fn kind(&self) -> EvidenceKind {
        match self {
            Evidence::Stat { .. } => EvidenceKind::Stat,
            Evidence::Link { .. } => EvidenceKind::Link,
            Evidence::Image { .. } => EvidenceKind::Image,
        }
    }

    /// One-line caption: the stat label or the link/image name.
    pub fn caption(&self) -> &str {
        match self {
            Evidence::Stat { label, .. } => label,
            Evidence::Link { name, .. } | Evidence::Image { name, .. } => name,
        }
    }
}

fn de_opt_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_stored_date))
}

fn de_null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Evidence>, D::Error> {
    Ok(Option::<Vec<Evidence>>::deserialize(deserializer)?.unwrap_or_default())
}

fn de_string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid evidence id: {other}"))),
    }
}
