//! Core types for the document store. Domain-agnostic.

use serde::{Deserialize, Serialize};

/// A stored document: its key within the collection plus its JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

impl ChangeType {
    /// Map a Postgres trigger operation (`TG_OP`) to a change type.
    pub fn from_tg_op(op: &str) -> Option<Self> {
        match op {
            "INSERT" => Some(ChangeType::Added),
            "UPDATE" => Some(ChangeType::Modified),
            "DELETE" => Some(ChangeType::Removed),
            _ => None,
        }
    }
}

/// One change on a collection's feed. For `Removed`, `document.data` is the
/// last known body, or `null` if the backend no longer has it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub change: ChangeType,
    pub document: Document,
}
