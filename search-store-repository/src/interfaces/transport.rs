//! Backend transport trait definition.

use async_trait::async_trait;

use crate::errors::SearchStoreError;
use crate::types::{BackendRequest, BackendResponse};

/// Sends single requests to the document-search backend.
///
/// Implementations return every HTTP response, error statuses included, as a
/// `BackendResponse`; only failures to obtain a response (connection refused,
/// unreadable body, ...) are returned as errors. Classification and retry are
/// the job of the `CallLayer`.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// Send one request and return the raw response.
    ///
    /// # Arguments
    ///
    /// * `request` - The backend operation to perform
    ///
    /// # Returns
    ///
    /// * `Ok(BackendResponse)` - The status, JSON body and lowercase headers
    /// * `Err(SearchStoreError)` - If no response could be obtained
    async fn send(&self, request: &BackendRequest) -> Result<BackendResponse, SearchStoreError>;
}
