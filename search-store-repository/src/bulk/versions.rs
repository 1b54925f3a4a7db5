//! Optimistic concurrency token prefetch.

use futures::future::join_all;
use tracing::debug;

use search_store_shared::Hit;

use crate::call_layer::{CallLayer, OperationContext};
use crate::entity::Entity;
use crate::errors::SearchStoreError;

/// Fill in `_seq_no`/`_primary_term` for items about to be written conditionally.
///
/// The current head of every item is fetched concurrently. A missing document
/// fails the whole call, as does a head whose version differs from the version
/// the item already carries. Items are only modified when every check passed.
pub async fn ensure_versions<T: Send>(
    layer: &CallLayer,
    ctx: &OperationContext,
    default_index: &str,
    items: &mut [&mut Entity<T>],
) -> Result<(), SearchStoreError> {
    if items.is_empty() {
        return Ok(());
    }

    let targets = items
        .iter()
        .map(|item| {
            let id = item.id().map(str::to_string).ok_or_else(|| {
                SearchStoreError::validation("Conditional writes need a storage id")
            })?;
            let index = item
                .meta
                .index
                .clone()
                .unwrap_or_else(|| default_index.to_string());
            Ok((index, id))
        })
        .collect::<Result<Vec<_>, SearchStoreError>>()?;

    debug!(
        correlation_id = %ctx.correlation_id(),
        items = targets.len(),
        "Fetching concurrency tokens"
    );
    let heads = join_all(
        targets
            .iter()
            .map(|(index, id)| layer.get_hit(ctx, index, id, false)),
    )
    .await
    .into_iter()
    .collect::<Result<Vec<Hit>, SearchStoreError>>()?;

    for (item, head) in items.iter().zip(&heads) {
        if let (Some(expected), Some(actual)) = (item.meta.version, head.version) {
            if expected != actual {
                return Err(SearchStoreError::VersionMismatch {
                    id: head.id.clone(),
                    expected,
                    actual,
                });
            }
        }
        if head.seq_no.is_none() || head.primary_term.is_none() {
            return Err(SearchStoreError::parse(format!(
                "Document {} returned without concurrency tokens",
                head.id
            )));
        }
    }

    for (item, head) in items.iter_mut().zip(heads) {
        item.meta.version = head.version.or(item.meta.version);
        item.meta.seq_no = head.seq_no;
        item.meta.primary_term = head.primary_term;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::interfaces::SearchTransport;
    use crate::types::{BackendRequest, BackendResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Answers gets from a fixed id -> version table.
    struct Heads(HashMap<String, u64>);

    #[async_trait]
    impl SearchTransport for Heads {
        async fn send(
            &self,
            request: &BackendRequest,
        ) -> Result<BackendResponse, SearchStoreError> {
            let BackendRequest::Get { index, id, .. } = request else {
                return Ok(BackendResponse::new(400, json!({ "error": "unexpected" })));
            };
            Ok(match self.0.get(id) {
                Some(version) => BackendResponse::new(
                    200,
                    json!({
                        "_index": index, "_id": id, "found": true,
                        "_version": version, "_seq_no": version * 10, "_primary_term": 1
                    }),
                ),
                None => BackendResponse::new(404, json!({ "_index": index, "_id": id, "found": false })),
            })
        }
    }

    fn layer(heads: &[(&str, u64)]) -> CallLayer {
        let table = heads.iter().map(|(id, v)| (id.to_string(), *v)).collect();
        CallLayer::new(Arc::new(Heads(table)), StoreConfig::default())
    }

    #[tokio::test]
    async fn test_fills_missing_tokens() {
        let layer = layer(&[("a", 3), ("b", 5)]);
        let ctx = OperationContext::new("test");
        let mut a = Entity::with_id("a", json!({}));
        let mut b = Entity::with_id("b", json!({}));
        b.meta.version = Some(5);

        ensure_versions(&layer, &ctx, "acme_notes", &mut [&mut a, &mut b])
            .await
            .unwrap();

        assert_eq!(a.meta.version, Some(3));
        assert_eq!(a.meta.seq_no, Some(30));
        assert_eq!(a.meta.primary_term, Some(1));
        assert_eq!(b.meta.seq_no, Some(50));
        assert_eq!(ctx.stats().calls, 2);
    }

    #[tokio::test]
    async fn test_missing_document_is_fatal() {
        let layer = layer(&[("a", 1)]);
        let ctx = OperationContext::new("test");
        let mut a = Entity::with_id("a", json!({}));
        let mut gone = Entity::with_id("gone", json!({}));

        let err = ensure_versions(&layer, &ctx, "acme_notes", &mut [&mut a, &mut gone])
            .await
            .unwrap_err();

        assert!(matches!(err, SearchStoreError::DocumentNotFound(_)));
        // nothing applied when one head is missing
        assert_eq!(a.meta.seq_no, None);
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let layer = layer(&[("a", 4)]);
        let ctx = OperationContext::new("test");
        let mut a = Entity::with_id("a", json!({}));
        a.meta.version = Some(2);

        let err = ensure_versions(&layer, &ctx, "acme_notes", &mut [&mut a])
            .await
            .unwrap_err();

        match err {
            SearchStoreError::VersionMismatch { id, expected, actual } => {
                assert_eq!(id, "a");
                assert_eq!(expected, 2);
                assert_eq!(actual, 4);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_item_without_id_is_rejected() {
        let layer = layer(&[]);
        let ctx = OperationContext::new("test");
        let mut fresh = Entity::new(json!({}));

        let err = ensure_versions(&layer, &ctx, "acme_notes", &mut [&mut fresh])
            .await
            .unwrap_err();

        assert!(matches!(err, SearchStoreError::ValidationError(_)));
        assert_eq!(ctx.stats().calls, 0);
    }
}
