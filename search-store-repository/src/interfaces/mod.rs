//! Interface definitions for the search store.
//!
//! This module defines the `SearchTransport` trait, the seam to the backend
//! that allows swapping the HTTP client for an in-memory fake, and the
//! `Collection` trait the search engine consumes.

mod collection;
mod transport;

pub use collection::{AfterSearch, Collection};
pub use transport::SearchTransport;
