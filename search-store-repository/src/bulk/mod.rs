//! Bulk writes with per-item status tracking.

mod bulk_array;
mod versions;

pub use bulk_array::BulkArray;
pub use versions::ensure_versions;
