//! Error types for the search store repository.
//!
//! This module provides a unified error type for all search store operations.

mod search_store_error;

pub(crate) use search_store_error::error_reason;
pub use search_store_error::SearchStoreError;
