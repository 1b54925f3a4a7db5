//! Request and response types exchanged with the backend.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{error_reason, SearchStoreError};

/// One backend operation.
///
/// Transports translate each variant into the matching REST call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendRequest {
    /// `POST /{index}/_search`, or `POST /_search` when the body carries a `pit`.
    Search { index: Option<String>, body: Value },
    /// `POST /_bulk` with an NDJSON body.
    Bulk { body: String, refresh: bool },
    /// `GET /{index}/_doc/{id}`.
    Get {
        index: String,
        id: String,
        source: bool,
    },
    /// `POST /{index}/_mget`.
    MultiGet { index: String, ids: Vec<String> },
    /// `POST /{index}/_count`.
    Count { index: String, body: Value },
    /// `POST /{index}/_update_by_query`.
    UpdateByQuery {
        index: String,
        body: Value,
        refresh: bool,
    },
    /// `POST /{index}/_delete_by_query`.
    DeleteByQuery {
        index: String,
        body: Value,
        refresh: bool,
    },
    /// Open a Point-in-Time cursor over `index`.
    OpenPointInTime { index: String, keep_alive: String },
    /// Release a Point-in-Time cursor.
    ClosePointInTime { id: String },
    /// `PUT /{index}` with settings, mappings and aliases.
    CreateIndex { index: String, body: Value },
    /// `HEAD /{index}`.
    IndexExists { index: String },
    /// `DELETE /{index}`.
    DeleteIndex { index: String },
    /// `POST /{index}/_refresh`.
    Refresh { index: String },
}

impl BackendRequest {
    /// Operation name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::Bulk { .. } => "bulk",
            Self::Get { .. } => "get",
            Self::MultiGet { .. } => "mget",
            Self::Count { .. } => "count",
            Self::UpdateByQuery { .. } => "update_by_query",
            Self::DeleteByQuery { .. } => "delete_by_query",
            Self::OpenPointInTime { .. } => "open_point_in_time",
            Self::ClosePointInTime { .. } => "close_point_in_time",
            Self::CreateIndex { .. } => "create_index",
            Self::IndexExists { .. } => "index_exists",
            Self::DeleteIndex { .. } => "delete_index",
            Self::Refresh { .. } => "refresh",
        }
    }
}

/// A raw backend response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendResponse {
    pub status: u16,
    pub body: Value,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
}

impl BackendResponse {
    /// Create a response without headers.
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            headers: HashMap::new(),
        }
    }

    /// The `content-length` header, 0 when absent or malformed.
    pub fn content_length(&self) -> u64 {
        self.headers
            .get("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A `_bulk` response body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<Value>,
}

impl BulkResponse {
    /// Fold a partial response into this one.
    pub fn merge(&mut self, other: BulkResponse) {
        self.took += other.took;
        self.errors |= other.errors;
        self.items.extend(other.items);
    }

    /// Parse every item of the response, in request order.
    pub fn results(&self) -> Result<Vec<BulkItemResult>, SearchStoreError> {
        self.items.iter().map(BulkItemResult::from_item).collect()
    }
}

/// The outcome of one action inside a bulk response.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemResult {
    /// `index`, `create`, `update` or `delete`.
    pub action: String,
    pub index: String,
    pub id: Option<String>,
    pub version: Option<u64>,
    pub seq_no: Option<u64>,
    pub primary_term: Option<u64>,
    pub status: u16,
    /// `created`, `updated`, `deleted`, `not_found`, ...
    pub result: Option<String>,
    /// Reason of the failure, when `status >= 400`.
    pub error: Option<String>,
}

impl BulkItemResult {
    /// Parse `{ "<action>": { ... } }`.
    pub fn from_item(item: &Value) -> Result<Self, SearchStoreError> {
        let (action, body) = item
            .as_object()
            .and_then(|map| map.iter().next())
            .ok_or_else(|| SearchStoreError::parse(format!("Malformed bulk item: {}", item)))?;

        let status = body
            .get("status")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchStoreError::parse(format!("Bulk item without status: {}", item)))?;
        let status = u16::try_from(status)
            .map_err(|_| SearchStoreError::parse(format!("Invalid bulk item status {}", status)))?;

        let error = if status >= 400 {
            error_reason(body).or_else(|| Some(format!("status {}", status)))
        } else {
            None
        };

        Ok(Self {
            action: action.clone(),
            index: body
                .get("_index")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            id: body.get("_id").and_then(Value::as_str).map(str::to_string),
            version: body.get("_version").and_then(Value::as_u64),
            seq_no: body.get("_seq_no").and_then(Value::as_u64),
            primary_term: body.get("_primary_term").and_then(Value::as_u64),
            status,
            result: body.get("result").and_then(Value::as_str).map(str::to_string),
            error,
        })
    }

    /// The message recorded on the item's status entry.
    pub fn message(&self) -> Option<String> {
        self.error.clone().or_else(|| self.result.clone())
    }
}
