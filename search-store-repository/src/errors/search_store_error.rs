//! Search store error types.
//!
//! This module defines the unified error type for all search store operations,
//! covering transport failures, backend status classes and local validation.

use serde_json::Value;
use thiserror::Error;

/// Unified errors from search store operations.
///
/// Backend responses with an error status are classified by code: 404, 409, 413
/// and 429 have dedicated variants, everything else becomes `Backend`.
#[derive(Debug, Clone, Error)]
pub enum SearchStoreError {
    /// Validation error (e.g., negative window bounds, wildcard write targets).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failed to establish connection to the backend.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The backend kept answering 429 after every allowed attempt.
    #[error("Too many requests: gave up after {attempts} attempts")]
    TooManyRequests { attempts: u32 },

    /// The request body exceeds what the backend or the local limit accepts.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// A bulk request could not be made small enough to be accepted.
    #[error("Bulk operation error: {0}")]
    BulkOperationError(String),

    /// The backend rejected a conditional write or delete.
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// The stored version differs from the version the caller holds.
    #[error("Version mismatch for {id}: expected {expected}, found {actual}")]
    VersionMismatch {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// Some shards failed to answer a search.
    #[error("Shard failure: {0}")]
    ShardFailure(String),

    /// Document not found.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Failed to create the index or its alias.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// Any other error status returned by the backend.
    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// Failed to parse response from the backend.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the backend.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Unknown error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SearchStoreError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a payload too large error.
    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::PayloadTooLarge(msg.into())
    }

    /// Create a bulk operation error.
    pub fn bulk_operation(msg: impl Into<String>) -> Self {
        Self::BulkOperationError(msg.into())
    }

    /// Create a version conflict error.
    pub fn version_conflict(msg: impl Into<String>) -> Self {
        Self::VersionConflict(msg.into())
    }

    /// Create a shard failure error.
    pub fn shard_failure(msg: impl Into<String>) -> Self {
        Self::ShardFailure(msg.into())
    }

    /// Create a document not found error.
    pub fn document_not_found(index: &str, id: &str) -> Self {
        Self::DocumentNotFound(format!("index={}, id={}", index, id))
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Classify an error response from the backend.
    ///
    /// The message is taken from `error.reason`, then `error` (string form),
    /// then `result`, falling back to the status code itself.
    pub fn from_status(status: u16, body: &Value) -> Self {
        let message = error_reason(body).unwrap_or_else(|| format!("status {}", status));
        match status {
            404 => Self::DocumentNotFound(message),
            409 => Self::VersionConflict(message),
            413 => Self::PayloadTooLarge(message),
            _ => Self::Backend { status, message },
        }
    }

    /// The HTTP-class status this error corresponds to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError(_) => 400,
            Self::DocumentNotFound(_) => 404,
            Self::VersionConflict(_) | Self::VersionMismatch { .. } => 409,
            Self::PayloadTooLarge(_) | Self::BulkOperationError(_) => 413,
            Self::TooManyRequests { .. } => 429,
            Self::Backend { status, .. } => *status,
            Self::ConnectionError(_) => 503,
            _ => 500,
        }
    }

    /// Returns true for errors that `send_bulk` answers by splitting the batch.
    pub fn is_payload_too_large(&self) -> bool {
        matches!(self, Self::PayloadTooLarge(_))
    }

    /// Returns true if the target document does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DocumentNotFound(_))
    }
}

/// Extract a human readable reason from an error body.
pub(crate) fn error_reason(body: &Value) -> Option<String> {
    match body.get("error") {
        Some(Value::String(reason)) => return Some(reason.clone()),
        Some(error) => {
            if let Some(reason) = error.get("reason").and_then(Value::as_str) {
                return Some(reason.to_string());
            }
            if let Some(kind) = error.get("type").and_then(Value::as_str) {
                return Some(kind.to_string());
            }
        }
        None => {}
    }
    body.get("result")
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl From<serde_json::Error> for SearchStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
