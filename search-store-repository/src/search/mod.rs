//! Pagination and search engine.
//!
//! Turns a `SearchRequest` into one or more backend searches and assembles an
//! exact result window, whether plain paging, a caller-managed cursor or an
//! implicit Point-in-Time traversal is needed.

mod engine;
mod sort;
mod window;

pub use engine::search_window;
pub use sort::{default_cursor_sort, normalize_sort};
pub use window::{normalize_window, Window};
