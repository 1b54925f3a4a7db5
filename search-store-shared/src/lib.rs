//! # Search Store Shared
//!
//! This crate defines shared data structures used across the search store crates.
//! It includes search requests and result windows, per-item bulk status types and
//! the tenant-scoped collection configuration.

pub mod types;

pub use types::{
    with_tenant, BulkStatusSnapshot, CallStats, CursorOptions, Hit, ItemState, ModelConfig,
    PageParam, ResultWindow, SearchRequest, SourceMode, StatusEntry, StatusReport,
    MAX_SAFE_INTEGER, MIN_SAFE_INTEGER,
};
