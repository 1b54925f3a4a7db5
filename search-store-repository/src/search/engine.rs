//! Search execution.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use search_store_shared::{Hit, ResultWindow, SearchRequest};

use crate::call_layer::OperationContext;
use crate::errors::SearchStoreError;
use crate::interfaces::Collection;
use crate::search::sort::{default_cursor_sort, normalize_sort};
use crate::search::window::{normalize_window, Window};
use crate::types::BackendRequest;

/// How a request is executed.
#[derive(Debug)]
struct Plan {
    window: Window,
    explicit_cursor: bool,
    implicit_cursor: bool,
    use_search_after: bool,
    /// `size` sent with each backend search.
    page_size: u64,
    /// Items read from absolute position 0 that precede the window.
    skip: u64,
    keep_alive: String,
}

impl Plan {
    fn new<C>(collection: &C, request: &SearchRequest) -> Result<Self, SearchStoreError>
    where
        C: Collection + ?Sized,
    {
        let window = normalize_window(request)?;
        let config = collection.call_layer().config();
        let page_limit = config.retry.page_limit;

        let explicit_cursor = request.cursor.explicit_cursor_id.is_some();
        let implicit_cursor = !explicit_cursor && window.end() > page_limit;
        let use_search_after = request.cursor.search_after.is_some();

        if (use_search_after || explicit_cursor) && window.from != 0 {
            return Err(SearchStoreError::validation(format!(
                "from must be 0 when a cursor or search_after is used, got {}",
                window.from
            )));
        }

        let page_size = if explicit_cursor && window.size_given {
            window.size.min(page_limit)
        } else if explicit_cursor || implicit_cursor {
            (collection.page_size_hint().max(1) as u64).min(page_limit.max(1))
        } else {
            window.size
        };

        Ok(Self {
            window,
            explicit_cursor,
            implicit_cursor,
            use_search_after,
            page_size,
            skip: if implicit_cursor { window.from } else { 0 },
            keep_alive: config.pit_keep_alive.clone(),
        })
    }

    fn uses_cursor(&self) -> bool {
        self.explicit_cursor || self.implicit_cursor
    }
}

/// Execute `request` against `collection` and assemble the exact window.
///
/// Windows ending beyond the page limit are read through an implicit
/// Point-in-Time cursor that is opened here and always closed before
/// returning. Caller-managed cursors (`explicit_cursor_id`) and `search_after`
/// requests fetch a single page; the caller continues with the returned
/// `cursor_id` and `last_sort_key`.
///
/// `convert` turns each hit inside the window into the returned item type.
pub async fn search_window<C, I, F>(
    collection: &C,
    ctx: &OperationContext,
    request: &SearchRequest,
    mut convert: F,
) -> Result<ResultWindow<I>, SearchStoreError>
where
    C: Collection + ?Sized,
    I: Send,
    F: FnMut(Hit) -> Result<I, SearchStoreError> + Send,
{
    let plan = Plan::new(collection, request)?;
    let mut body = build_body(request, &plan)?;
    let search_after = request.cursor.search_after.clone();

    debug!(
        correlation_id = %ctx.correlation_id(),
        from = plan.window.from,
        size = plan.window.size,
        page_size = plan.page_size,
        explicit_cursor = plan.explicit_cursor,
        implicit_cursor = plan.implicit_cursor,
        "Planned search"
    );

    if !plan.implicit_cursor {
        let mut cursor_id = request.cursor.explicit_cursor_id.clone();
        let mut window = traverse(
            collection,
            ctx,
            &plan,
            &mut body,
            search_after,
            &mut cursor_id,
            &mut convert,
        )
        .await?;
        if plan.explicit_cursor {
            window.cursor_id = cursor_id;
        }
        return Ok(window);
    }

    let mut cursor_id = Some(collection.open_pit(ctx).await?);
    let result = traverse(
        collection,
        ctx,
        &plan,
        &mut body,
        search_after,
        &mut cursor_id,
        &mut convert,
    )
    .await;

    if let Some(id) = cursor_id.as_deref() {
        if let Err(e) = collection.close_pit(ctx, id).await {
            warn!(
                correlation_id = %ctx.correlation_id(),
                error = %e,
                "Failed to close point in time"
            );
        }
    }

    result
}

fn build_body(request: &SearchRequest, plan: &Plan) -> Result<Map<String, Value>, SearchStoreError> {
    let mut body = match &request.body {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(SearchStoreError::validation(format!(
                "Search body must be an object, got {}",
                other
            )))
        }
    };

    for key in ["from", "size", "pit", "search_after"] {
        body.remove(key);
    }

    if plan.uses_cursor() {
        body.insert("from".to_string(), json!(0));
        body.insert("size".to_string(), json!(plan.page_size));
    } else {
        body.insert("from".to_string(), json!(plan.window.from));
        body.insert("size".to_string(), json!(plan.window.size));
    }

    if let Some(source) = request.source.to_json() {
        body.insert("_source".to_string(), source);
    }
    // hits carry no version or concurrency tokens unless asked for
    body.entry("version").or_insert(json!(true));
    body.entry("seq_no_primary_term").or_insert(json!(true));

    if let Some(track) = request.cursor.track_total_hits {
        body.insert("track_total_hits".to_string(), json!(track));
    }

    let sort = match body.remove("sort") {
        Some(Value::Null) | None => None,
        Some(sort) => Some(normalize_sort(&sort)?),
    };
    match sort {
        Some(sort) => {
            body.insert("sort".to_string(), Value::Array(sort));
        }
        None if request.cursor.auto_sort && (plan.uses_cursor() || plan.use_search_after) => {
            body.insert("sort".to_string(), Value::Array(default_cursor_sort()));
        }
        None => {}
    }

    Ok(body)
}

async fn traverse<C, I, F>(
    collection: &C,
    ctx: &OperationContext,
    plan: &Plan,
    body: &mut Map<String, Value>,
    mut search_after: Option<Vec<Value>>,
    cursor_id: &mut Option<String>,
    convert: &mut F,
) -> Result<ResultWindow<I>, SearchStoreError>
where
    C: Collection + ?Sized,
    I: Send,
    F: FnMut(Hit) -> Result<I, SearchStoreError> + Send,
{
    let layer = collection.call_layer();
    let mut window = ResultWindow::default();
    let mut position: u64 = 0;
    let mut first_page = true;

    loop {
        if let Some(id) = cursor_id.as_deref() {
            body.insert(
                "pit".to_string(),
                json!({ "id": id, "keep_alive": plan.keep_alive }),
            );
        }
        if let Some(after) = &search_after {
            body.insert("search_after".to_string(), json!(after));
        }

        let index = match cursor_id {
            Some(_) => None,
            None => Some(collection.alias()),
        };
        let response = layer
            .call(
                ctx,
                BackendRequest::Search {
                    index,
                    body: Value::Object(body.clone()),
                },
            )
            .await?;
        // cursor ids rotate per request, even on failed pages
        if let Some(id) = response.body.get("pit_id").and_then(Value::as_str) {
            *cursor_id = Some(id.to_string());
        }
        check_shard_failures(&response.body)?;

        if first_page {
            window.total = parse_total(&response.body);
            window.aggregations = response.body.get("aggregations").cloned();
            first_page = false;
        }

        let hits: Vec<Hit> = match response.body.pointer("/hits/hits") {
            Some(hits) => serde_json::from_value(hits.clone())
                .map_err(|e| SearchStoreError::parse(format!("Invalid hits: {}", e)))?,
            None => Vec::new(),
        };
        collection.record_page(hits.len(), response.content_length());

        let page_len = hits.len() as u64;
        let mut page_last_sort = None;
        for hit in hits {
            if window.items.len() as u64 >= plan.window.size {
                break;
            }
            position += 1;
            page_last_sort = hit.sort.clone();
            if position <= plan.skip {
                continue;
            }
            window.last_sort_key = hit.sort.clone();
            window.items.push(convert(hit)?);
        }

        debug!(
            correlation_id = %ctx.correlation_id(),
            page_hits = page_len,
            collected = window.items.len(),
            "Search page"
        );

        let filled = window.items.len() as u64 >= plan.window.size;
        if !plan.implicit_cursor || filled || page_len == 0 || page_len < plan.page_size {
            break;
        }
        match page_last_sort {
            Some(sort) => search_after = Some(sort),
            None => {
                return Err(SearchStoreError::parse(
                    "Cursor page returned hits without sort values",
                ))
            }
        }
    }

    Ok(window)
}

fn check_shard_failures(body: &Value) -> Result<(), SearchStoreError> {
    let failures = body
        .pointer("/_shards/failures")
        .and_then(Value::as_array)
        .filter(|failures| !failures.is_empty());
    if let Some(failures) = failures {
        let reason = failures[0]
            .pointer("/reason/reason")
            .or_else(|| failures[0].pointer("/reason/type"))
            .and_then(Value::as_str)
            .unwrap_or("unknown reason");
        return Err(SearchStoreError::shard_failure(format!(
            "{} shard(s) failed: {}",
            failures.len(),
            reason
        )));
    }

    let failed = body
        .pointer("/_shards/failed")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if failed > 0 {
        return Err(SearchStoreError::shard_failure(format!(
            "{} shard(s) failed",
            failed
        )));
    }
    Ok(())
}

fn parse_total(body: &Value) -> Option<u64> {
    match body.pointer("/hits/total")? {
        Value::Number(n) => n.as_u64(),
        total => total.get("value").and_then(Value::as_u64),
    }
}
