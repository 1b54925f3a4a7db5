//! Search request types.
//!
//! This module defines the request structures handed to the search engine:
//! the query body, the requested result window and the cursor options.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Largest integer that survives a round trip through an IEEE-754 double.
///
/// Used as the "unbounded" window size and as the pinned `missing` sentinel for
/// ascending sorts.
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// Smallest integer that survives a round trip through an IEEE-754 double.
pub const MIN_SAFE_INTEGER: i64 = -9_007_199_254_740_991;

/// A window bound (`from` or `size`) as it arrives from the caller.
///
/// Callers frequently forward query-string values, so numeric strings are
/// accepted and normalised by the search engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageParam {
    Number(i64),
    Text(String),
}

impl From<i64> for PageParam {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<u64> for PageParam {
    fn from(value: u64) -> Self {
        Self::Number(value.min(MAX_SAFE_INTEGER as u64) as i64)
    }
}

impl From<usize> for PageParam {
    fn from(value: usize) -> Self {
        Self::from(value as u64)
    }
}

impl From<i32> for PageParam {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<&str> for PageParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PageParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl PageParam {
    /// Interpret a JSON value embedded in a request body.
    ///
    /// Returns `None` for `null`, for non-integer numbers and for values that
    /// are neither numbers nor strings.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Self::Number)
                .or_else(|| n.as_u64().map(Self::from)),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

/// How `_source` is requested from the backend.
///
/// Only full sources can be turned into typed entities; any other mode yields
/// raw hits.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceMode {
    /// `_source` is not sent; the backend returns the full document.
    #[default]
    Omit,
    /// `_source: true|false`.
    Enabled(bool),
    /// `_source: ["field", ...]`.
    Fields(Vec<String>),
}

impl SourceMode {
    /// Returns true if hits carry the complete document source.
    pub fn wants_instances(&self) -> bool {
        matches!(self, SourceMode::Omit | SourceMode::Enabled(true))
    }

    /// The `_source` value to put on the request body, if any.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            SourceMode::Omit => None,
            SourceMode::Enabled(enabled) => Some(json!(enabled)),
            SourceMode::Fields(fields) => Some(json!(fields)),
        }
    }
}

/// Cursor behaviour for a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorOptions {
    /// A Point-in-Time id opened and owned by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_cursor_id: Option<String>,

    /// Sort values of the last item of the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_after: Option<Vec<Value>>,

    /// Inject a document-order tie-break sort when a cursor is used without a sort.
    #[serde(default = "default_auto_sort")]
    pub auto_sort: bool,

    /// Forwarded as `track_total_hits` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_total_hits: Option<bool>,
}

fn default_auto_sort() -> bool {
    true
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            explicit_cursor_id: None,
            search_after: None,
            auto_sort: default_auto_sort(),
            track_total_hits: None,
        }
    }
}

impl CursorOptions {
    /// Continue a caller-managed Point-in-Time cursor.
    pub fn with_cursor(id: impl Into<String>) -> Self {
        Self {
            explicit_cursor_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Set the sort values to continue after.
    pub fn after(mut self, sort_key: Vec<Value>) -> Self {
        self.search_after = Some(sort_key);
        self
    }
}

/// A search request against a single collection.
///
/// `body` is the backend query body (`query`, `sort`, `aggs`, ...). A `from` or
/// `size` embedded in the body is only used when the explicit parameter is absent.
///
/// # Example
///
/// ```
/// use search_store_shared::SearchRequest;
/// use serde_json::json;
///
/// let request = SearchRequest::new(json!({ "query": { "term": { "kind": "note" } } }))
///     .from(20)
///     .size("10");
/// assert!(request.size.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<PageParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<PageParam>,
    #[serde(default)]
    pub source: SourceMode,
    #[serde(default)]
    pub cursor: CursorOptions,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self::match_all()
    }
}

impl SearchRequest {
    /// Create a request from a query body.
    pub fn new(body: Value) -> Self {
        Self {
            body,
            from: None,
            size: None,
            source: SourceMode::Omit,
            cursor: CursorOptions::default(),
        }
    }

    /// A request matching every document of the collection.
    pub fn match_all() -> Self {
        Self::new(json!({ "query": { "match_all": {} } }))
    }

    pub fn from(mut self, from: impl Into<PageParam>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn size(mut self, size: impl Into<PageParam>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn source(mut self, source: SourceMode) -> Self {
        self.source = source;
        self
    }

    pub fn cursor(mut self, cursor: CursorOptions) -> Self {
        self.cursor = cursor;
        self
    }
}
