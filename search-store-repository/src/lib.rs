//! # Search Store Repository
//!
//! Typed access to tenant-scoped collections in an OpenSearch-like document
//! store. Every backend request goes through the [`CallLayer`], which absorbs
//! rate limiting and oversized bulk payloads; [`Model`] exposes search with
//! transparent deep pagination, and [`BulkArray`] tracks per-item outcomes of
//! bulk writes.

pub mod bulk;
pub mod call_layer;
pub mod config;
pub mod entity;
pub mod errors;
pub mod interfaces;
pub mod model;
pub mod opensearch;
pub mod search;
pub mod types;
pub mod utils;

pub use bulk::{ensure_versions, BulkArray};
pub use call_layer::{CallLayer, OperationContext};
pub use config::{RetryPolicy, StoreConfig};
pub use entity::{Entity, EntityMeta, ItemTag};
pub use errors::SearchStoreError;
pub use interfaces::{AfterSearch, Collection, SearchTransport};
pub use model::Model;
pub use opensearch::OpenSearchTransport;
pub use search::search_window;
pub use types::{BackendRequest, BackendResponse, BulkItemResult, BulkResponse};
