//! Error types for the search store binary.

use search_store_repository::SearchStoreError;
use thiserror::Error;

/// Errors that can occur while configuring or running a command.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid command line input.
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Error returned by the store.
    #[error("Store error: {0}")]
    StoreError(#[from] SearchStoreError),

    /// Failure writing command output.
    #[error("Output error: {0}")]
    OutputError(#[from] std::io::Error),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create an input error.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::InputError(msg.into())
    }
}
