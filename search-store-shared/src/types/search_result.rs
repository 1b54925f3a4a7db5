//! Search result types.
//!
//! This module defines the raw hit as returned by the backend and the result
//! window assembled by the search engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single raw hit from `hits.hits[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index", default)]
    pub index: String,

    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,

    #[serde(rename = "_seq_no", default, skip_serializing_if = "Option::is_none")]
    pub seq_no: Option<u64>,

    #[serde(
        rename = "_primary_term",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub primary_term: Option<u64>,

    #[serde(rename = "_score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Sort values, present when the request was sorted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<Value>>,

    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

/// Cumulative cost of one logical operation.
///
/// Every backend call made on behalf of the operation adds to it, retries included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStats {
    /// Number of backend calls issued.
    pub calls: u64,
    /// Sum of response `content-length` headers, in bytes.
    pub bytes: u64,
    /// Wall time spent waiting on the backend.
    pub latency: Duration,
}

/// An exact window of search results plus out-of-band metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultWindow<I> {
    pub items: Vec<I>,

    /// `hits.total.value` of the first response, when tracked.
    pub total: Option<u64>,

    /// Aggregations of the first response.
    pub aggregations: Option<Value>,

    /// Latest cursor id; only set for caller-managed cursors.
    pub cursor_id: Option<String>,

    /// Sort values of the last item, used to chain the next request.
    pub last_sort_key: Option<Vec<Value>>,

    pub stats: CallStats,
}

impl<I> Default for ResultWindow<I> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: None,
            aggregations: None,
            cursor_id: None,
            last_sort_key: None,
            stats: CallStats::default(),
        }
    }
}

impl<I> ResultWindow<I> {
    /// Create an empty window.
    pub fn empty() -> Self {
        Self {
            total: Some(0),
            ..Self::default()
        }
    }

    /// Returns true if the window holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items in the window.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Convert every item, keeping the metadata.
    pub fn map<J, F>(self, f: F) -> ResultWindow<J>
    where
        F: FnMut(I) -> J,
    {
        ResultWindow {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            aggregations: self.aggregations,
            cursor_id: self.cursor_id,
            last_sort_key: self.last_sort_key,
            stats: self.stats,
        }
    }
}

impl<I> IntoIterator for ResultWindow<I> {
    type Item = I;
    type IntoIter = std::vec::IntoIter<I>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hit_deserialization() {
        let hit: Hit = serde_json::from_value(json!({
            "_index": "acme_notes_v0",
            "_id": "n-1",
            "_version": 3,
            "_seq_no": 12,
            "_primary_term": 1,
            "_score": null,
            "sort": [5, 17],
            "_source": { "title": "hello" }
        }))
        .unwrap();

        assert_eq!(hit.index, "acme_notes_v0");
        assert_eq!(hit.id, "n-1");
        assert_eq!(hit.version, Some(3));
        assert_eq!(hit.seq_no, Some(12));
        assert_eq!(hit.primary_term, Some(1));
        assert_eq!(hit.score, None);
        assert_eq!(hit.sort, Some(vec![json!(5), json!(17)]));
        assert_eq!(hit.source, Some(json!({ "title": "hello" })));
    }

    #[test]
    fn test_empty_window() {
        let window: ResultWindow<Hit> = ResultWindow::empty();
        assert!(window.is_empty());
        assert_eq!(window.len(), 0);
        assert_eq!(window.total, Some(0));
    }

    #[test]
    fn test_window_map_keeps_metadata() {
        let window = ResultWindow {
            items: vec![1, 2, 3],
            total: Some(40),
            aggregations: Some(json!({ "kinds": {} })),
            cursor_id: Some("pit".to_string()),
            last_sort_key: Some(vec![json!(3)]),
            stats: CallStats {
                calls: 2,
                bytes: 10,
                latency: Duration::from_millis(4),
            },
        };

        let mapped = window.map(|i| i * 10);
        assert_eq!(mapped.items, vec![10, 20, 30]);
        assert_eq!(mapped.total, Some(40));
        assert_eq!(mapped.cursor_id.as_deref(), Some("pit"));
        assert_eq!(mapped.stats.calls, 2);
    }
}
