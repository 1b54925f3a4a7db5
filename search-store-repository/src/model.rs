//! Typed, tenant-scoped collections.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use search_store_shared::{with_tenant, Hit, ModelConfig, ResultWindow, SearchRequest};

use crate::bulk::BulkArray;
use crate::call_layer::{CallLayer, OperationContext};
use crate::entity::Entity;
use crate::errors::SearchStoreError;
use crate::interfaces::{AfterSearch, Collection};
use crate::opensearch::create_index_body;
use crate::search::search_window;
use crate::types::BackendRequest;

/// A collection of `T` documents behind a tenant-scoped alias.
///
/// # Example
///
/// ```ignore
/// let layer = CallLayer::new(Arc::new(transport), StoreConfig::default());
/// let notes: Model<Note> = Model::new(ModelConfig::new("acme", "notes"), layer)?;
/// notes.ensure_index().await?;
///
/// let saved = notes.save_one(Entity::new(note), false).await?;
/// let window = notes.search(SearchRequest::match_all().size(20)).await?;
/// ```
pub struct Model<T: Send> {
    config: ModelConfig,
    layer: CallLayer,
    after_search: Option<Arc<dyn AfterSearch<T>>>,
    observed_docs: AtomicU64,
    observed_bytes: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Model<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a model, validating the collection configuration.
    pub fn new(config: ModelConfig, layer: CallLayer) -> Result<Self, SearchStoreError> {
        config
            .validate()
            .map_err(|problems| SearchStoreError::validation(problems.join("; ")))?;

        Ok(Self {
            config,
            layer,
            after_search: None,
            observed_docs: AtomicU64::new(0),
            observed_bytes: AtomicU64::new(0),
            _marker: PhantomData,
        })
    }

    /// Install a hook run once per search over the typed window.
    pub fn with_after_search(mut self, hook: Arc<dyn AfterSearch<T>>) -> Self {
        self.after_search = Some(hook);
        self
    }

    /// The same collection for another tenant, sharing the call layer and hook.
    pub fn for_tenant(&self, tenant: impl Into<String>) -> Result<Self, SearchStoreError> {
        let model = Self::new(with_tenant(&self.config, tenant), self.layer.clone())?;
        Ok(Self {
            after_search: self.after_search.clone(),
            ..model
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn alias(&self) -> String {
        self.config.alias()
    }

    fn refresh_on_write(&self) -> bool {
        self.config.immediate_refresh
    }

    /// Search for typed entities.
    ///
    /// Requires the full `_source`; use [`Model::search_hits`] for field lists or
    /// `_source: false`. The after-search hook runs once over a non-empty window.
    pub async fn search(
        &self,
        request: SearchRequest,
    ) -> Result<ResultWindow<Entity<T>>, SearchStoreError> {
        if !request.source.wants_instances() {
            return Err(SearchStoreError::validation(
                "Typed search needs the full _source, use search_hits for partial sources",
            ));
        }

        let ctx = OperationContext::new("search");
        let result = search_window(self, &ctx, &request, Entity::from_hit).await;
        let stats = ctx.finish();
        let mut window = result?;

        if !window.is_empty() {
            if let Some(hook) = &self.after_search {
                hook.after_search(&mut window.items).await?;
            }
        }
        window.stats = stats;
        Ok(window)
    }

    /// Search for raw hits, whatever the source mode.
    pub async fn search_hits(
        &self,
        request: SearchRequest,
    ) -> Result<ResultWindow<Hit>, SearchStoreError> {
        let ctx = OperationContext::new("search");
        let result = search_window(self, &ctx, &request, Ok).await;
        let stats = ctx.finish();
        let mut window = result?;
        window.stats = stats;
        Ok(window)
    }

    /// Every entity matching `query`, read through an implicit cursor.
    pub async fn find_all(&self, query: Value) -> Result<Vec<Entity<T>>, SearchStoreError> {
        let request = SearchRequest::new(json!({ "query": query_or_match_all(query) }));
        Ok(self.search(request).await?.items)
    }

    /// Fetch one entity by id.
    pub async fn get(&self, id: &str) -> Result<Entity<T>, SearchStoreError> {
        let ctx = OperationContext::new("get");
        let result = self.layer.get_hit(&ctx, &self.alias(), id, true).await;
        ctx.finish();
        Entity::from_hit(result?)
    }

    /// Fetch several entities in one request. Missing ids are skipped.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<Entity<T>>, SearchStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ctx = OperationContext::new("get_many");
        let request = BackendRequest::MultiGet {
            index: self.alias(),
            ids: ids.to_vec(),
        };
        let result = self.layer.call(&ctx, request).await;
        ctx.finish();
        let response = result?;

        let docs = response
            .body
            .get("docs")
            .and_then(Value::as_array)
            .ok_or_else(|| SearchStoreError::parse("mget response without docs"))?;

        let mut entities = Vec::with_capacity(docs.len());
        for doc in docs {
            if doc.get("found").and_then(Value::as_bool) != Some(true) {
                continue;
            }
            let hit: Hit = serde_json::from_value(doc.clone())
                .map_err(|e| SearchStoreError::parse(format!("Invalid mget doc: {}", e)))?;
            entities.push(Entity::from_hit(hit)?);
        }
        Ok(entities)
    }

    /// Number of documents matching `query`.
    pub async fn count(&self, query: Value) -> Result<u64, SearchStoreError> {
        let ctx = OperationContext::new("count");
        let request = BackendRequest::Count {
            index: self.alias(),
            body: json!({ "query": query_or_match_all(query) }),
        };
        let result = self.layer.call(&ctx, request).await;
        ctx.finish();

        result?
            .body
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchStoreError::parse("count response without count"))
    }

    /// Run `script` on every document matching `query`; returns the number updated.
    pub async fn update_by_query(&self, query: Value, script: Value) -> Result<u64, SearchStoreError> {
        let ctx = OperationContext::new("update_by_query");
        let request = BackendRequest::UpdateByQuery {
            index: self.alias(),
            body: json!({ "query": query_or_match_all(query), "script": script }),
            refresh: self.refresh_on_write(),
        };
        let result = self.layer.call(&ctx, request).await;
        ctx.finish();

        Ok(result?.body.get("updated").and_then(Value::as_u64).unwrap_or(0))
    }

    /// Delete every document matching `query`; returns the number deleted.
    pub async fn delete_by_query(&self, query: Value) -> Result<u64, SearchStoreError> {
        let ctx = OperationContext::new("delete_by_query");
        let request = BackendRequest::DeleteByQuery {
            index: self.alias(),
            body: json!({ "query": query_or_match_all(query) }),
            refresh: self.refresh_on_write(),
        };
        let result = self.layer.call(&ctx, request).await;
        ctx.finish();

        Ok(result?.body.get("deleted").and_then(Value::as_u64).unwrap_or(0))
    }

    /// Open a caller-managed Point-in-Time cursor.
    ///
    /// Pass the id through `CursorOptions::with_cursor` and release it with
    /// [`Model::close_cursor`].
    pub async fn open_cursor(&self) -> Result<String, SearchStoreError> {
        let ctx = OperationContext::new("open_cursor");
        let result = Collection::open_pit(self, &ctx).await;
        ctx.finish();
        result
    }

    pub async fn close_cursor(&self, id: &str) -> Result<(), SearchStoreError> {
        let ctx = OperationContext::new("close_cursor");
        let result = Collection::close_pit(self, &ctx, id).await;
        ctx.finish();
        result
    }

    /// Create the versioned index with its alias unless it already exists.
    ///
    /// Returns true if the index was created.
    pub async fn ensure_index(&self) -> Result<bool, SearchStoreError> {
        let ctx = OperationContext::new("ensure_index");
        let result = self.create_index_unless_exists(&ctx).await;
        ctx.finish();
        result
    }

    async fn create_index_unless_exists(
        &self,
        ctx: &OperationContext,
    ) -> Result<bool, SearchStoreError> {
        let index = self.config.index_name();

        let exists = match self
            .layer
            .call(ctx, BackendRequest::IndexExists { index: index.clone() })
            .await
        {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };
        if exists {
            debug!(index = %index, "Index already exists");
            return Ok(false);
        }

        let request = BackendRequest::CreateIndex {
            index: index.clone(),
            body: create_index_body(&self.config),
        };
        self.layer
            .call(ctx, request)
            .await
            .map_err(|e| SearchStoreError::index_creation(format!("{}: {}", index, e)))?;

        info!(index = %index, alias = %self.alias(), "Created index");
        Ok(true)
    }

    /// Delete the versioned index. Returns false if it did not exist.
    pub async fn delete_index(&self) -> Result<bool, SearchStoreError> {
        let ctx = OperationContext::new("delete_index");
        let result = self
            .layer
            .call(
                &ctx,
                BackendRequest::DeleteIndex {
                    index: self.config.index_name(),
                },
            )
            .await;
        ctx.finish();

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Make recent writes visible to search.
    pub async fn refresh(&self) -> Result<(), SearchStoreError> {
        let ctx = OperationContext::new("refresh");
        let result = self
            .layer
            .call(&ctx, BackendRequest::Refresh { index: self.alias() })
            .await;
        ctx.finish();
        result.map(|_| ())
    }

    /// Start a bulk batch over `items`, targeting this collection.
    pub fn bulk(&self, items: Vec<Entity<T>>) -> BulkArray<T> {
        BulkArray::from_items(self.alias(), items)
    }

    /// Save one entity; any failed item status is returned as an error.
    pub async fn save_one(
        &self,
        entity: Entity<T>,
        use_version: bool,
    ) -> Result<Entity<T>, SearchStoreError> {
        let mut batch = self.bulk(vec![entity]);
        batch.save(self, use_version).await?;
        single_result(batch)
    }

    /// Delete one entity; any failed item status is returned as an error.
    pub async fn delete_one(
        &self,
        entity: Entity<T>,
        use_version: bool,
    ) -> Result<(), SearchStoreError> {
        let mut batch = self.bulk(vec![entity]);
        batch.delete(self, use_version).await?;
        single_result(batch).map(|_| ())
    }

    /// Re-read one entity from the backend, keeping its identity tag.
    pub async fn reload_one(&self, mut entity: Entity<T>) -> Result<Entity<T>, SearchStoreError> {
        let id = entity
            .id()
            .map(str::to_string)
            .ok_or_else(|| SearchStoreError::validation("Cannot reload an entity without id"))?;
        let index = entity.meta.index.clone().unwrap_or_else(|| self.alias());

        let ctx = OperationContext::new("reload");
        let result = self.layer.get_hit(&ctx, &index, &id, true).await;
        ctx.finish();

        entity.refresh_from(result?)?;
        Ok(entity)
    }
}

/// Unwrap a one-item batch, turning a failed status entry into an error.
fn single_result<T: Send>(mut batch: BulkArray<T>) -> Result<Entity<T>, SearchStoreError> {
    let tag = batch
        .first()
        .map(Entity::tag)
        .ok_or_else(|| SearchStoreError::unknown("Single item batch lost its item"))?;

    if let Some(entry) = batch.status_of(tag).filter(|entry| entry.is_failed()) {
        let status = entry.status.unwrap_or(500);
        let message = entry
            .message
            .clone()
            .unwrap_or_else(|| format!("status {}", status));
        return Err(SearchStoreError::from_status(status, &json!({ "error": message })));
    }

    batch
        .into_items()
        .pop()
        .ok_or_else(|| SearchStoreError::unknown("Single item batch lost its item"))
}

fn query_or_match_all(query: Value) -> Value {
    if query.is_null() {
        json!({ "match_all": {} })
    } else {
        query
    }
}

#[async_trait]
impl<T> Collection for Model<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn alias(&self) -> String {
        self.config.alias()
    }

    fn call_layer(&self) -> &CallLayer {
        &self.layer
    }

    /// Aims cursor pages at `target_page_bytes` once documents were observed.
    fn page_size_hint(&self) -> usize {
        let config = self.layer.config();
        let docs = self.observed_docs.load(Ordering::Relaxed);
        let bytes = self.observed_bytes.load(Ordering::Relaxed);
        if docs == 0 || bytes == 0 {
            return config.default_page_size;
        }

        let average = (bytes / docs).max(1);
        let size = (config.target_page_bytes / average).clamp(1, config.retry.page_limit.max(1));
        usize::try_from(size).unwrap_or(config.default_page_size)
    }

    fn record_page(&self, hits: usize, bytes: u64) {
        if hits == 0 || bytes == 0 {
            return;
        }
        self.observed_docs.fetch_add(hits as u64, Ordering::Relaxed);
        self.observed_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    async fn open_pit(&self, ctx: &OperationContext) -> Result<String, SearchStoreError> {
        let request = BackendRequest::OpenPointInTime {
            index: self.config.alias(),
            keep_alive: self.layer.config().pit_keep_alive.clone(),
        };
        let response = self.layer.call(ctx, request).await?;

        let id = response
            .body
            .get("pit_id")
            .or_else(|| response.body.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| SearchStoreError::parse("Point in time response without id"))?;
        debug!(correlation_id = %ctx.correlation_id(), "Opened point in time");
        Ok(id.to_string())
    }

    async fn close_pit(&self, ctx: &OperationContext, id: &str) -> Result<(), SearchStoreError> {
        let request = BackendRequest::ClosePointInTime { id: id.to_string() };
        match self.layer.call(ctx, request).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
