//! OpenSearch implementation of the search transport.
//!
//! This module provides the concrete `SearchTransport` used in production and
//! the index settings applied when a collection's index is created.

mod index_config;
mod transport;

pub use index_config::{create_index_body, default_index_settings};
pub use transport::OpenSearchTransport;
