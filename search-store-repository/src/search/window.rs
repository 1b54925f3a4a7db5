//! Normalisation of the requested result window.

use serde_json::Value;

use search_store_shared::{PageParam, SearchRequest, MAX_SAFE_INTEGER};

use crate::errors::SearchStoreError;

/// A validated `from`/`size` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: u64,
    pub size: u64,
    /// Whether `size` came from the caller rather than the unbounded default.
    pub size_given: bool,
}

impl Window {
    /// Absolute offset one past the last requested item.
    pub fn end(&self) -> u64 {
        self.from.saturating_add(self.size)
    }
}

/// Resolve `from` and `size` for a request.
///
/// Explicit parameters win over values embedded in the body. Numeric strings are
/// accepted; negative or non-numeric values are rejected. A missing size means
/// "everything after `from`".
pub fn normalize_window(request: &SearchRequest) -> Result<Window, SearchStoreError> {
    let from = resolve("from", request.from.as_ref(), &request.body)?;
    let size = resolve("size", request.size.as_ref(), &request.body)?;

    let from = from.unwrap_or(0);
    let max = MAX_SAFE_INTEGER as u64;
    Ok(Window {
        from,
        size: size.unwrap_or_else(|| max.saturating_sub(from)),
        size_given: size.is_some(),
    })
}

fn resolve(
    name: &str,
    param: Option<&PageParam>,
    body: &Value,
) -> Result<Option<u64>, SearchStoreError> {
    if let Some(param) = param {
        return parse_param(name, param).map(Some);
    }
    match body.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match PageParam::from_json(value) {
            Some(param) => parse_param(name, &param).map(Some),
            None => Err(SearchStoreError::validation(format!(
                "{} must be a non-negative integer, got {}",
                name, value
            ))),
        },
    }
}

fn parse_param(name: &str, param: &PageParam) -> Result<u64, SearchStoreError> {
    let value = match param {
        PageParam::Number(n) => *n,
        PageParam::Text(text) => text.trim().parse::<i64>().map_err(|_| {
            SearchStoreError::validation(format!(
                "{} must be a non-negative integer, got '{}'",
                name, text
            ))
        })?,
    };

    if value < 0 {
        return Err(SearchStoreError::validation(format!(
            "{} must not be negative, got {}",
            name, value
        )));
    }
    Ok(value as u64)
}
