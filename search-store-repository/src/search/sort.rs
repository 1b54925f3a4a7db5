//! Sort normalisation for cursor traversal.
//!
//! Every clause is rewritten to `{ field: { order, missing, ... } }`. Field
//! sorts get an explicit `missing` value within the safe integer range: the
//! backend's own sentinels for `_last`/`_first` are 64-bit extremes, which do
//! not survive a double round trip and break `search_after` continuity.

use serde_json::{json, Map, Value};

use search_store_shared::{MAX_SAFE_INTEGER, MIN_SAFE_INTEGER};

use crate::errors::SearchStoreError;

/// Tie-break sort injected for cursors without an explicit sort.
pub fn default_cursor_sort() -> Vec<Value> {
    vec![json!({ "_doc": { "order": "asc" } })]
}

/// Normalise a `sort` value (string, object or array of either).
pub fn normalize_sort(sort: &Value) -> Result<Vec<Value>, SearchStoreError> {
    match sort {
        Value::Array(clauses) => clauses.iter().map(normalize_clause).collect(),
        other => Ok(vec![normalize_clause(other)?]),
    }
}

fn normalize_clause(clause: &Value) -> Result<Value, SearchStoreError> {
    let (field, mut options) = match clause {
        Value::String(spec) => {
            let (field, order) = match spec.split_once(':') {
                Some((field, order)) => (field, Some(order)),
                None => (spec.as_str(), None),
            };
            let mut options = Map::new();
            if let Some(order) = order {
                options.insert("order".to_string(), json!(order));
            }
            (field.to_string(), options)
        }
        Value::Object(map) if map.len() == 1 => {
            let Some((field, spec)) = map.iter().next() else {
                return Err(SearchStoreError::validation("Empty sort clause"));
            };
            let options = match spec {
                Value::String(order) => {
                    let mut options = Map::new();
                    options.insert("order".to_string(), json!(order));
                    options
                }
                Value::Object(options) => options.clone(),
                other => {
                    return Err(SearchStoreError::validation(format!(
                        "Invalid sort options for '{}': {}",
                        field, other
                    )))
                }
            };
            (field.clone(), options)
        }
        other => {
            return Err(SearchStoreError::validation(format!(
                "Invalid sort clause: {}",
                other
            )))
        }
    };

    let descending = match options.get("order").and_then(Value::as_str) {
        Some(order) if order.eq_ignore_ascii_case("desc") => true,
        Some(order) if order.eq_ignore_ascii_case("asc") => false,
        Some(order) => {
            return Err(SearchStoreError::validation(format!(
                "Invalid sort order '{}' for '{}'",
                order, field
            )))
        }
        None => field == "_score",
    };
    options.insert(
        "order".to_string(),
        json!(if descending { "desc" } else { "asc" }),
    );

    // _score, _doc and friends have no missing values
    if !field.starts_with('_') {
        let missing = match options.get("missing") {
            None => Some(last_sentinel(descending)),
            Some(Value::String(s)) if s == "_last" => Some(last_sentinel(descending)),
            Some(Value::String(s)) if s == "_first" => Some(last_sentinel(!descending)),
            Some(_) => None,
        };
        if let Some(missing) = missing {
            options.insert("missing".to_string(), json!(missing));
        }
    }

    let mut normalized = Map::new();
    normalized.insert(field, Value::Object(options));
    Ok(Value::Object(normalized))
}

/// Value sorting after every real value in the given direction.
fn last_sentinel(descending: bool) -> i64 {
    if descending {
        MIN_SAFE_INTEGER
    } else {
        MAX_SAFE_INTEGER
    }
}
