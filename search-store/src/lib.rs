//! # Search Store
//!
//! Command line driver for one tenant-scoped collection stored in OpenSearch.
//!
//! ## Modules
//!
//! - [`config`]: Settings and dependency initialization
//! - [`commands`]: The commands run against the collection
//! - [`errors`]: Error types for the binary

pub mod commands;
pub mod config;
pub mod errors;

pub use commands::{run, run_to_completion, Command};
pub use config::{ConnectionMode, Dependencies, Settings};
pub use errors::AppError;
