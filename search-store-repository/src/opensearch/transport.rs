//! OpenSearch transport.
//!
//! Maps every `BackendRequest` onto a REST call issued through the OpenSearch
//! Rust crate's generic `send`, and hands the raw status, headers and JSON
//! body back to the call layer.

use std::collections::HashMap;

use async_trait::async_trait;
use opensearch::{
    http::{
        headers::{HeaderMap, HeaderValue, CONTENT_TYPE},
        transport::{SingleNodeConnectionPool, TransportBuilder},
        Method,
    },
    OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use crate::errors::SearchStoreError;
use crate::interfaces::SearchTransport;
use crate::types::{BackendRequest, BackendResponse};
use crate::utils::encode_path_segment;

const NDJSON: &str = "application/x-ndjson";

/// `SearchTransport` backed by a single OpenSearch node.
///
/// # Example
///
/// ```ignore
/// let transport = OpenSearchTransport::new("http://localhost:9200")?;
/// let layer = CallLayer::new(Arc::new(transport), StoreConfig::default());
/// ```
pub struct OpenSearchTransport {
    client: OpenSearch,
}

impl OpenSearchTransport {
    /// Create a transport for the node at `url`.
    pub fn new(url: &str) -> Result<Self, SearchStoreError> {
        let parsed_url = Url::parse(url).map_err(|e| SearchStoreError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchStoreError::connection(e.to_string()))?;

        info!(url = %url, "Created OpenSearch transport");
        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }

    /// Check that the node answers.
    pub async fn ping(&self) -> Result<(), SearchStoreError> {
        let response = self
            .client
            .send(
                Method::Head,
                "/",
                HeaderMap::new(),
                None::<&()>,
                None::<String>,
                None,
            )
            .await
            .map_err(|e| SearchStoreError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SearchStoreError::connection(format!(
                "Ping failed with status {}",
                status
            )));
        }
        Ok(())
    }
}

/// A resolved REST call.
#[derive(Debug)]
struct Route {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<String>,
    ndjson: bool,
}

impl Route {
    fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
            ndjson: false,
        }
    }

    fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    fn json(mut self, body: &Value) -> Self {
        self.body = Some(body.to_string());
        self
    }
}

fn refresh_param(refresh: bool) -> &'static str {
    if refresh {
        "true"
    } else {
        "false"
    }
}

fn route(request: &BackendRequest) -> Route {
    match request {
        BackendRequest::Search { index, body } => {
            let path = match index {
                Some(index) => format!("/{}/_search", encode_path_segment(index)),
                None => "/_search".to_string(),
            };
            Route::new(Method::Post, path).json(body)
        }
        BackendRequest::Bulk { body, refresh } => {
            let mut route =
                Route::new(Method::Post, "/_bulk".to_string()).query("refresh", refresh_param(*refresh));
            route.body = Some(body.clone());
            route.ndjson = true;
            route
        }
        BackendRequest::Get { index, id, source } => {
            let route = Route::new(
                Method::Get,
                format!(
                    "/{}/_doc/{}",
                    encode_path_segment(index),
                    encode_path_segment(id)
                ),
            );
            if *source {
                route
            } else {
                route.query("_source", "false")
            }
        }
        BackendRequest::MultiGet { index, ids } => Route::new(
            Method::Post,
            format!("/{}/_mget", encode_path_segment(index)),
        )
        .json(&json!({ "ids": ids })),
        BackendRequest::Count { index, body } => Route::new(
            Method::Post,
            format!("/{}/_count", encode_path_segment(index)),
        )
        .json(body),
        BackendRequest::UpdateByQuery {
            index,
            body,
            refresh,
        } => Route::new(
            Method::Post,
            format!("/{}/_update_by_query", encode_path_segment(index)),
        )
        .query("refresh", refresh_param(*refresh))
        .json(body),
        BackendRequest::DeleteByQuery {
            index,
            body,
            refresh,
        } => Route::new(
            Method::Post,
            format!("/{}/_delete_by_query", encode_path_segment(index)),
        )
        .query("refresh", refresh_param(*refresh))
        .json(body),
        BackendRequest::OpenPointInTime { index, keep_alive } => Route::new(
            Method::Post,
            format!("/{}/_search/point_in_time", encode_path_segment(index)),
        )
        .query("keep_alive", keep_alive.clone()),
        BackendRequest::ClosePointInTime { id } => {
            Route::new(Method::Delete, "/_search/point_in_time".to_string())
                .json(&json!({ "pit_id": [id] }))
        }
        BackendRequest::CreateIndex { index, body } => {
            Route::new(Method::Put, format!("/{}", encode_path_segment(index))).json(body)
        }
        BackendRequest::IndexExists { index } => {
            Route::new(Method::Head, format!("/{}", encode_path_segment(index)))
        }
        BackendRequest::DeleteIndex { index } => {
            Route::new(Method::Delete, format!("/{}", encode_path_segment(index)))
        }
        BackendRequest::Refresh { index } => Route::new(
            Method::Post,
            format!("/{}/_refresh", encode_path_segment(index)),
        ),
    }
}

/// Parse a response body; non-JSON bodies are kept as a string.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[async_trait]
impl SearchTransport for OpenSearchTransport {
    async fn send(&self, request: &BackendRequest) -> Result<BackendResponse, SearchStoreError> {
        let route = route(request);

        let mut headers = HeaderMap::new();
        if route.ndjson {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(NDJSON));
        }

        let response = self
            .client
            .send(
                route.method,
                &route.path,
                headers,
                Some(&route.query),
                route.body,
                None,
            )
            .await
            .map_err(|e| SearchStoreError::connection(e.to_string()))?;

        let status = response.status_code().as_u16();
        let response_headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_lowercase(), value.to_string()))
            })
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| SearchStoreError::connection(e.to_string()))?;

        debug!(
            request = request.name(),
            path = %route.path,
            status,
            "OpenSearch response"
        );

        Ok(BackendResponse {
            status,
            body: parse_body(&text),
            headers: response_headers,
        })
    }
}
