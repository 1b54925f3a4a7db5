//! This module defines the core data structures shared by the search store crates.
//! It re-exports the request, result, status and configuration types.

pub mod bulk_status;
pub mod model_config;
pub mod search_query;
pub mod search_result;

pub use bulk_status::{BulkStatusSnapshot, ItemState, StatusEntry, StatusReport};
pub use model_config::{with_tenant, ModelConfig};
pub use search_query::{
    CursorOptions, PageParam, SearchRequest, SourceMode, MAX_SAFE_INTEGER, MIN_SAFE_INTEGER,
};
pub use search_result::{CallStats, Hit, ResultWindow};
