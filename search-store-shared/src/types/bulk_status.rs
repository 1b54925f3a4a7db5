//! Per-item status tracking types for bulk operations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state of a tracked bulk item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    NotFound,
    Rejected,
    InProgress,
    Finished,
}

impl ItemState {
    /// Returns true for `Rejected` and `Finished`.
    pub fn is_settled(&self) -> bool {
        matches!(self, ItemState::Rejected | ItemState::Finished)
    }
}

/// Status of one item, keyed by its identity tag in the owning batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Storage id, when known.
    pub id: Option<String>,

    /// Collection address the item was written to or read from.
    pub index: String,

    /// HTTP-class status of the last operation on this item.
    pub status: Option<u16>,

    pub message: Option<String>,

    pub state: ItemState,

    /// Free-form metadata attached by the caller.
    pub payload: Map<String, Value>,
}

impl StatusEntry {
    /// A fresh `InProgress` entry.
    pub fn in_progress(id: Option<String>, index: impl Into<String>) -> Self {
        Self {
            id,
            index: index.into(),
            status: None,
            message: None,
            state: ItemState::InProgress,
            payload: Map::new(),
        }
    }

    /// Returns true if the recorded status is an error (`>= 400`).
    pub fn is_failed(&self) -> bool {
        self.status.is_some_and(|status| status >= 400)
    }

    /// The externally visible view of this entry.
    pub fn report(&self) -> StatusReport {
        StatusReport {
            id: self.id.clone(),
            index: self.index.clone(),
            status: self.status,
            message: self.message.clone(),
            payload: self.payload.clone(),
        }
    }
}

/// A status entry without the internal lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    #[serde(rename = "_index")]
    pub index: String,
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub payload: Map<String, Value>,
}

/// Bulk-response shaped snapshot of a status table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkStatusSnapshot {
    pub items: Vec<StatusReport>,
    /// True if any tracked entry failed, whether listed or not.
    pub errors: bool,
    pub count: usize,
}
