//! Typed collection items.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use search_store_shared::Hit;

use crate::errors::SearchStoreError;

/// Identity of an item inside bulk status tracking.
///
/// Assigned once when the entity is constructed and never derived from the
/// storage id, so it survives id changes and reordering of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemTag(Uuid);

impl ItemTag {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ItemTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Storage metadata of an entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityMeta {
    /// Storage id; `None` until the backend assigned one.
    pub id: Option<String>,
    /// Index the entity was read from; writes target the collection alias when unset.
    pub index: Option<String>,
    pub version: Option<u64>,
    pub seq_no: Option<u64>,
    pub primary_term: Option<u64>,
    pub score: Option<f64>,
    pub sort: Option<Vec<Value>>,
}

/// A typed document plus its storage metadata.
#[derive(Debug, Clone)]
pub struct Entity<T> {
    tag: ItemTag,
    pub meta: EntityMeta,
    pub source: T,
}

impl<T> Entity<T> {
    /// Create a new, not yet stored entity.
    pub fn new(source: T) -> Self {
        Self {
            tag: ItemTag::new(),
            meta: EntityMeta::default(),
            source,
        }
    }

    /// Create an entity with a caller-chosen storage id.
    pub fn with_id(id: impl Into<String>, source: T) -> Self {
        let mut entity = Self::new(source);
        entity.meta.id = Some(id.into());
        entity
    }

    pub fn tag(&self) -> ItemTag {
        self.tag
    }

    pub fn id(&self) -> Option<&str> {
        self.meta.id.as_deref()
    }

    /// Returns true if both `_seq_no` and `_primary_term` are known.
    pub fn has_concurrency_tokens(&self) -> bool {
        self.meta.seq_no.is_some() && self.meta.primary_term.is_some()
    }

    fn apply_meta(&mut self, hit: &Hit) {
        self.meta.id = Some(hit.id.clone());
        if !hit.index.is_empty() {
            self.meta.index = Some(hit.index.clone());
        }
        self.meta.version = hit.version.or(self.meta.version);
        self.meta.seq_no = hit.seq_no.or(self.meta.seq_no);
        self.meta.primary_term = hit.primary_term.or(self.meta.primary_term);
        self.meta.score = hit.score;
        self.meta.sort = hit.sort.clone();
    }
}

impl<T: DeserializeOwned> Entity<T> {
    /// Build an entity from a hit carrying the full `_source`.
    pub fn from_hit(hit: Hit) -> Result<Self, SearchStoreError> {
        let mut entity = Self::new(Self::decode_source(&hit)?);
        entity.apply_meta(&hit);
        Ok(entity)
    }

    /// Replace source and metadata with a freshly fetched hit, keeping the tag.
    pub fn refresh_from(&mut self, hit: Hit) -> Result<(), SearchStoreError> {
        self.source = Self::decode_source(&hit)?;
        self.apply_meta(&hit);
        Ok(())
    }

    fn decode_source(hit: &Hit) -> Result<T, SearchStoreError> {
        let source = hit.source.clone().ok_or_else(|| {
            SearchStoreError::parse(format!("Hit {} has no _source", hit.id))
        })?;
        serde_json::from_value(source)
            .map_err(|e| SearchStoreError::parse(format!("Invalid _source for {}: {}", hit.id, e)))
    }
}

impl<T: Serialize> Entity<T> {
    /// The document body sent to the backend.
    pub fn to_document(&self) -> Result<Value, SearchStoreError> {
        serde_json::to_value(&self.source).map_err(|e| SearchStoreError::serialization(e.to_string()))
    }
}
