//! Mutable batch of entities with a status table keyed by identity tag.

use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use search_store_shared::{BulkStatusSnapshot, ItemState, StatusEntry};

use crate::bulk::versions::ensure_versions;
use crate::call_layer::OperationContext;
use crate::entity::{Entity, ItemTag};
use crate::errors::SearchStoreError;
use crate::interfaces::Collection;
use crate::model::Model;
use crate::types::{BulkItemResult, BulkResponse};
use crate::utils::is_wildcard_address;

/// A batch of pending writes and deletes.
///
/// Derefs to the visible `Vec<Entity<T>>`, so items can be pushed, removed and
/// reordered freely; status entries follow the items by identity tag. Entries
/// are created `IN_PROGRESS` the first time an item is observed and are only
/// moved out of the visible collection by [`BulkArray::clear`].
#[derive(Debug)]
pub struct BulkArray<T> {
    items: Vec<Entity<T>>,
    default_index: String,
    statuses: HashMap<ItemTag, StatusEntry>,
    rejected: Vec<Entity<T>>,
    finished: Vec<Entity<T>>,
}

impl<T> Deref for BulkArray<T> {
    type Target = Vec<Entity<T>>;

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<T> DerefMut for BulkArray<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.items
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkAction {
    Index,
    Delete,
}

impl<T> BulkArray<T> {
    /// An empty batch writing to `default_index` unless an item says otherwise.
    pub fn new(default_index: impl Into<String>) -> Self {
        Self::from_items(default_index, Vec::new())
    }

    pub fn from_items(default_index: impl Into<String>, items: Vec<Entity<T>>) -> Self {
        Self {
            items,
            default_index: default_index.into(),
            statuses: HashMap::new(),
            rejected: Vec::new(),
            finished: Vec::new(),
        }
    }

    fn destination(&self, entity: &Entity<T>) -> String {
        entity
            .meta
            .index
            .clone()
            .unwrap_or_else(|| self.default_index.clone())
    }

    /// Make sure every visible item has a status entry.
    fn observe_all(&mut self) {
        for entity in &self.items {
            if !self.statuses.contains_key(&entity.tag()) {
                let entry = StatusEntry::in_progress(
                    entity.meta.id.clone(),
                    entity
                        .meta
                        .index
                        .clone()
                        .unwrap_or_else(|| self.default_index.clone()),
                );
                self.statuses.insert(entity.tag(), entry);
            }
        }
    }

    /// The status entry of `tag`, synthesized `IN_PROGRESS` when missing.
    fn entry_mut(&mut self, tag: ItemTag) -> &mut StatusEntry {
        let items = &self.items;
        let default_index = &self.default_index;
        self.statuses.entry(tag).or_insert_with(|| {
            match items.iter().find(|entity| entity.tag() == tag) {
                Some(entity) => StatusEntry::in_progress(
                    entity.meta.id.clone(),
                    entity
                        .meta
                        .index
                        .clone()
                        .unwrap_or_else(|| default_index.clone()),
                ),
                None => StatusEntry::in_progress(None, default_index.clone()),
            }
        })
    }

    /// Full status table, keyed by identity tag.
    pub fn status(&mut self) -> &HashMap<ItemTag, StatusEntry> {
        self.observe_all();
        &self.statuses
    }

    /// Entries recorded so far, without synthesizing missing ones.
    pub fn status_table(&self) -> &HashMap<ItemTag, StatusEntry> {
        &self.statuses
    }

    pub fn status_of(&self, tag: ItemTag) -> Option<&StatusEntry> {
        self.statuses.get(&tag)
    }

    /// Mark an item rejected.
    ///
    /// `code` replaces the recorded status when given; otherwise a missing or
    /// non-error status becomes 400. `message` is only replaced when given.
    pub fn reject(&mut self, tag: ItemTag, code: Option<u16>, message: Option<String>) {
        let entry = self.entry_mut(tag);
        entry.state = ItemState::Rejected;
        entry.status = match (code, entry.status) {
            (Some(code), _) => Some(code),
            (None, Some(status)) if status >= 400 => Some(status),
            (None, _) => Some(400),
        };
        if message.is_some() {
            entry.message = message;
        }
    }

    /// Mark an item finished. A missing status becomes 200.
    pub fn finish(&mut self, tag: ItemTag, code: Option<u16>, message: Option<String>) {
        let entry = self.entry_mut(tag);
        entry.state = ItemState::Finished;
        entry.status = code.or(entry.status).or(Some(200));
        if message.is_some() {
            entry.message = message;
        }
    }

    /// Mark an item as missing upstream.
    pub fn not_found(&mut self, tag: ItemTag, message: Option<String>) {
        let entry = self.entry_mut(tag);
        entry.state = ItemState::NotFound;
        entry.status = Some(404);
        if message.is_some() {
            entry.message = message;
        }
    }

    /// Reject every item whose recorded status is an error.
    pub fn reject_failed(&mut self) {
        self.observe_all();
        let failed: Vec<ItemTag> = self
            .statuses
            .iter()
            .filter(|(_, entry)| entry.is_failed())
            .map(|(tag, _)| *tag)
            .collect();
        for tag in failed {
            self.reject(tag, None, None);
        }
    }

    /// Sweep settled items out of the visible collection.
    ///
    /// `IN_PROGRESS` items stay in place, rejected and finished ones move to
    /// their buckets, anything else is dropped.
    pub fn clear(&mut self) {
        self.observe_all();

        let mut rejected = Vec::new();
        let mut finished = Vec::new();
        let mut dropped = 0usize;
        let mut i = self.items.len();
        while i > 0 {
            i -= 1;
            let state = self
                .statuses
                .get(&self.items[i].tag())
                .map(|entry| entry.state)
                .unwrap_or(ItemState::InProgress);
            match state {
                ItemState::InProgress => {}
                ItemState::Rejected => rejected.push(self.items.remove(i)),
                ItemState::Finished => finished.push(self.items.remove(i)),
                ItemState::NotFound => {
                    self.items.remove(i);
                    dropped += 1;
                }
            }
        }

        debug!(
            rejected = rejected.len(),
            finished = finished.len(),
            dropped,
            remaining = self.items.len(),
            "Cleared bulk array"
        );
        self.rejected.extend(rejected.into_iter().rev());
        self.finished.extend(finished.into_iter().rev());
    }

    /// Caller metadata attached to an item's status entry.
    pub fn payload(&mut self, tag: ItemTag) -> &mut Map<String, Value> {
        &mut self.entry_mut(tag).payload
    }

    /// Merge other status tables into this one; foreign entries win on collision.
    pub fn import_status<'a, I>(&mut self, tables: I)
    where
        I: IntoIterator<Item = &'a HashMap<ItemTag, StatusEntry>>,
    {
        for table in tables {
            for (tag, entry) in table {
                self.statuses.insert(*tag, entry.clone());
            }
        }
    }

    /// Bulk-response shaped snapshot of the status table.
    ///
    /// Lists failed entries only, unless `include_all` is set. `errors` reflects
    /// every entry either way.
    pub fn es_status(&mut self, include_all: bool) -> BulkStatusSnapshot {
        self.observe_all();

        let mut order: Vec<ItemTag> = self
            .items
            .iter()
            .chain(&self.rejected)
            .chain(&self.finished)
            .map(Entity::tag)
            .collect();
        let known: HashSet<ItemTag> = order.iter().copied().collect();
        let mut detached: Vec<ItemTag> = self
            .statuses
            .keys()
            .filter(|tag| !known.contains(*tag))
            .copied()
            .collect();
        detached.sort();
        order.extend(detached);

        let items: Vec<_> = order
            .iter()
            .filter_map(|tag| self.statuses.get(tag))
            .filter(|entry| include_all || entry.is_failed())
            .map(StatusEntry::report)
            .collect();

        BulkStatusSnapshot {
            errors: self.statuses.values().any(StatusEntry::is_failed),
            count: items.len(),
            items,
        }
    }

    /// Items swept out as rejected.
    pub fn rejected(&self) -> &[Entity<T>] {
        &self.rejected
    }

    /// Items swept out as finished.
    pub fn finished(&self) -> &[Entity<T>] {
        &self.finished
    }

    pub fn into_items(self) -> Vec<Entity<T>> {
        self.items
    }

    /// Positions of the visible items still in progress.
    fn pending(&mut self) -> Vec<usize> {
        self.observe_all();
        self.items
            .iter()
            .enumerate()
            .filter(|(_, entity)| {
                self.statuses
                    .get(&entity.tag())
                    .is_some_and(|entry| entry.state == ItemState::InProgress)
            })
            .map(|(pos, _)| pos)
            .collect()
    }

    fn check_destinations(&self, selected: &[usize]) -> Result<(), SearchStoreError> {
        for &pos in selected {
            let destination = self.destination(&self.items[pos]);
            if is_wildcard_address(&destination) {
                return Err(SearchStoreError::validation(format!(
                    "Cannot write to wildcard address '{}'",
                    destination
                )));
            }
        }
        Ok(())
    }

    fn action_header(&self, entity: &Entity<T>, action: BulkAction, use_version: bool) -> Value {
        let mut header = Map::new();
        header.insert("_index".to_string(), json!(self.destination(entity)));
        if let Some(id) = entity.id() {
            header.insert("_id".to_string(), json!(id));
        }
        if use_version {
            if let (Some(seq_no), Some(primary_term)) =
                (entity.meta.seq_no, entity.meta.primary_term)
            {
                header.insert("if_seq_no".to_string(), json!(seq_no));
                header.insert("if_primary_term".to_string(), json!(primary_term));
            }
        }
        let name = match action {
            BulkAction::Index => "index",
            BulkAction::Delete => "delete",
        };
        let mut action_line = Map::new();
        action_line.insert(name.to_string(), Value::Object(header));
        Value::Object(action_line)
    }

    /// Copy a bulk response back onto the selected items, in request order.
    fn reconcile(
        &mut self,
        selected: &[usize],
        response: &BulkResponse,
        action: BulkAction,
    ) -> Result<(), SearchStoreError> {
        let results = response.results()?;
        if results.len() != selected.len() {
            return Err(SearchStoreError::bulk_operation(format!(
                "bulk response has {} items for {} actions",
                results.len(),
                selected.len()
            )));
        }

        for (&pos, result) in selected.iter().zip(results) {
            let tag = self.items[pos].tag();
            if result.status < 400 {
                apply_result(&mut self.items[pos], &result, action);
            }

            let entry = self.entry_mut(tag);
            entry.status = Some(result.status);
            entry.message = result.message();
            if let Some(id) = result.id {
                if entry.id.as_deref() != Some(id.as_str()) {
                    if let Some(previous) = entry.id.take() {
                        entry.payload.insert("originalId".to_string(), json!(previous));
                    }
                    entry.id = Some(id);
                }
            }
            if !result.index.is_empty() {
                entry.index = result.index;
            }
        }
        Ok(())
    }
}

impl<T> BulkArray<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Index every `IN_PROGRESS` item.
    ///
    /// With `use_version`, every item needs a storage id and the write is
    /// conditioned on its `_seq_no`/`_primary_term`, fetched first for items
    /// that lack them. Per-item failures land in the status table.
    pub async fn save(&mut self, model: &Model<T>, use_version: bool) -> Result<(), SearchStoreError> {
        self.submit(model, BulkAction::Index, use_version).await
    }

    /// Delete every `IN_PROGRESS` item. Every item needs a storage id.
    pub async fn delete(
        &mut self,
        model: &Model<T>,
        use_version: bool,
    ) -> Result<(), SearchStoreError> {
        self.submit(model, BulkAction::Delete, use_version).await
    }

    async fn submit(
        &mut self,
        model: &Model<T>,
        action: BulkAction,
        use_version: bool,
    ) -> Result<(), SearchStoreError> {
        let ctx = OperationContext::new(match action {
            BulkAction::Index => "save",
            BulkAction::Delete => "delete",
        });
        let result = self.submit_with(&ctx, model, action, use_version).await;
        ctx.finish();
        result
    }

    async fn submit_with(
        &mut self,
        ctx: &OperationContext,
        model: &Model<T>,
        action: BulkAction,
        use_version: bool,
    ) -> Result<(), SearchStoreError> {
        let selected = self.pending();
        if selected.is_empty() {
            return Ok(());
        }
        self.check_destinations(&selected)?;

        if use_version || action == BulkAction::Delete {
            if let Some(&pos) = selected.iter().find(|&&pos| self.items[pos].id().is_none()) {
                return Err(SearchStoreError::validation(format!(
                    "Item {} has no storage id",
                    self.items[pos].tag()
                )));
            }
        }

        if use_version {
            let default_index = self.default_index.clone();
            let wanted: HashSet<usize> = selected.iter().copied().collect();
            let mut missing: Vec<&mut Entity<T>> = self
                .items
                .iter_mut()
                .enumerate()
                .filter(|(pos, entity)| wanted.contains(pos) && !entity.has_concurrency_tokens())
                .map(|(_, entity)| entity)
                .collect();
            ensure_versions(model.call_layer(), ctx, &default_index, &mut missing).await?;
        }

        let mut lines = Vec::with_capacity(selected.len() * 2);
        for &pos in &selected {
            let entity = &self.items[pos];
            lines.push(self.action_header(entity, action, use_version));
            if action == BulkAction::Index {
                lines.push(entity.to_document()?);
            }
        }

        debug!(
            correlation_id = %ctx.correlation_id(),
            action = ?action,
            items = selected.len(),
            "Submitting bulk"
        );
        let response = model
            .call_layer()
            .send_bulk(ctx, &lines, model.config().immediate_refresh)
            .await?;
        if response.errors {
            warn!(
                correlation_id = %ctx.correlation_id(),
                action = ?action,
                "Bulk response reported item errors"
            );
        }

        self.reconcile(&selected, &response, action)
    }

    /// Re-read every `IN_PROGRESS` item, then sweep settled items.
    ///
    /// Items that cannot be read are rejected with the failure's status.
    pub async fn reload(&mut self, model: &Model<T>) -> Result<(), SearchStoreError> {
        let ctx = OperationContext::new("reload");
        let selected = self.pending();

        let targets: Vec<(usize, String, Option<String>)> = selected
            .iter()
            .map(|&pos| {
                let entity = &self.items[pos];
                (pos, self.destination(entity), entity.meta.id.clone())
            })
            .collect();

        let layer = model.call_layer();
        let fetches = targets.iter().map(|(_, index, id)| {
            let ctx = &ctx;
            async move {
                match id {
                    Some(id) => layer.get_hit(ctx, index, id, true).await,
                    None => Err(SearchStoreError::validation("item has no storage id")),
                }
            }
        });
        let heads = join_all(fetches).await;

        for ((pos, _, id), head) in targets.iter().zip(heads) {
            let refreshed = head.and_then(|hit| self.items[*pos].refresh_from(hit));
            if let Err(e) = refreshed {
                let tag = self.items[*pos].tag();
                let label = id.clone().unwrap_or_else(|| tag.to_string());
                self.reject(
                    tag,
                    Some(e.status_code()),
                    Some(format!("Failed to reload {}: {}", label, e)),
                );
            }
        }
        ctx.finish();

        self.clear();
        Ok(())
    }
}

fn apply_result<T>(entity: &mut Entity<T>, result: &BulkItemResult, action: BulkAction) {
    if action == BulkAction::Index {
        if let Some(id) = &result.id {
            entity.meta.id = Some(id.clone());
        }
        if !result.index.is_empty() {
            entity.meta.index = Some(result.index.clone());
        }
    }
    entity.meta.version = result.version.or(entity.meta.version);
    entity.meta.seq_no = result.seq_no.or(entity.meta.seq_no);
    entity.meta.primary_term = result.primary_term.or(entity.meta.primary_term);
}
