//! Collection collaborator consumed by the search engine.

use async_trait::async_trait;

use crate::call_layer::{CallLayer, OperationContext};
use crate::entity::Entity;
use crate::errors::SearchStoreError;

/// A logical, tenant-scoped collection.
///
/// `Model` is the implementation used by application code; the search engine
/// only depends on this trait.
#[async_trait]
pub trait Collection: Send + Sync {
    /// The collection address every request targets.
    fn alias(&self) -> String;

    /// The call layer used for every backend request.
    fn call_layer(&self) -> &CallLayer;

    /// Page size for cursor traversals.
    fn page_size_hint(&self) -> usize;

    /// Report a page of `hits` documents that took `bytes` on the wire.
    fn record_page(&self, _hits: usize, _bytes: u64) {}

    /// Open a Point-in-Time cursor over the collection.
    async fn open_pit(&self, ctx: &OperationContext) -> Result<String, SearchStoreError>;

    /// Release a Point-in-Time cursor. Unknown ids are not an error.
    async fn close_pit(&self, ctx: &OperationContext, id: &str) -> Result<(), SearchStoreError>;
}

/// Hook run once per search with every typed item of the window.
#[async_trait]
pub trait AfterSearch<T: Send>: Send + Sync {
    async fn after_search(&self, items: &mut [Entity<T>]) -> Result<(), SearchStoreError>;
}
