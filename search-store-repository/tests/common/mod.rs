//! In-memory OpenSearch stand-in shared by the integration suites.
#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use search_store_repository::{
    BackendRequest, BackendResponse, CallLayer, Model, RetryPolicy, SearchStoreError,
    SearchTransport, StoreConfig,
};
use search_store_shared::ModelConfig;

pub const INDEX: &str = "acme_notes_v0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub n: i64,
    pub title: String,
}

impl Note {
    pub fn new(n: i64) -> Self {
        Self {
            n,
            title: format!("note {}", n),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredDoc {
    id: String,
    version: u64,
    seq_no: u64,
    order: u64,
    source: Value,
}

#[derive(Default)]
struct State {
    docs: Vec<StoredDoc>,
    next_seq: u64,
    next_order: u64,
    next_id: u64,
    next_pit: u64,
    pits: HashMap<String, Vec<StoredDoc>>,
    index_created: bool,
    rate_limited: u32,
    max_bulk_lines: Option<usize>,
    fail_shards: bool,
    searches: u64,
    requests: Vec<&'static str>,
}

/// Single-index backend keeping documents in insertion (`_doc`) order.
///
/// Point-in-time ids rotate on every search: the id used is retired and a new
/// one is returned as `pit_id`.
pub struct FakeBackend {
    state: Mutex<State>,
    max_window: u64,
}

/// Sort clause as understood by the fake: field, descending, missing value.
type Clause = (String, bool, Value);

impl FakeBackend {
    /// A backend refusing plain paging beyond `max_window`.
    pub fn new(max_window: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            max_window,
        })
    }

    /// Insert notes `0..n` with ids `doc-000`, `doc-001`, ...
    pub fn seed(&self, n: i64) {
        let mut state = self.state.lock().unwrap();
        for i in 0..n {
            let source = serde_json::to_value(Note::new(i)).unwrap();
            state.index_doc(Some(format!("doc-{:03}", i)), source, None);
        }
    }

    /// Answer the next `count` requests with 429.
    pub fn rate_limit(&self, count: u32) {
        self.state.lock().unwrap().rate_limited = count;
    }

    /// Refuse bulk bodies with more than `lines` lines with 413.
    pub fn limit_bulk_lines(&self, lines: usize) {
        self.state.lock().unwrap().max_bulk_lines = Some(lines);
    }

    /// Report a failed shard on every search.
    pub fn fail_shards(&self) {
        self.state.lock().unwrap().fail_shards = true;
    }

    pub fn open_pits(&self) -> usize {
        self.state.lock().unwrap().pits.len()
    }

    pub fn doc_count(&self) -> usize {
        self.state.lock().unwrap().docs.len()
    }

    pub fn requests(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count_requests(&self, name: &str) -> usize {
        self.requests().iter().filter(|r| **r == name).count()
    }

    fn handle(&self, request: &BackendRequest) -> BackendResponse {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.name());
        if state.rate_limited > 0 {
            state.rate_limited -= 1;
            return respond(429, json!({ "error": "rate limited" }));
        }

        match request {
            BackendRequest::Search { body, .. } => self.search(&mut state, body),
            BackendRequest::Bulk { body, .. } => state.bulk(body),
            BackendRequest::Get { id, source, .. } => match state.find(id) {
                Some(doc) => {
                    let mut hit = hit_json(doc, &[], &json!(*source));
                    hit["found"] = json!(true);
                    respond(200, hit)
                }
                None => respond(404, json!({ "_index": INDEX, "_id": id, "found": false })),
            },
            BackendRequest::MultiGet { ids, .. } => {
                let docs: Vec<Value> = ids
                    .iter()
                    .map(|id| match state.find(id) {
                        Some(doc) => {
                            let mut hit = hit_json(doc, &[], &Value::Null);
                            hit["found"] = json!(true);
                            hit
                        }
                        None => json!({ "_index": INDEX, "_id": id, "found": false }),
                    })
                    .collect();
                respond(200, json!({ "docs": docs }))
            }
            BackendRequest::Count { body, .. } => {
                let query = body.get("query").cloned().unwrap_or(Value::Null);
                let count = state.docs.iter().filter(|d| matches(&query, d)).count();
                respond(200, json!({ "count": count }))
            }
            BackendRequest::UpdateByQuery { body, .. } => {
                let query = body.get("query").cloned().unwrap_or(Value::Null);
                let set = body
                    .pointer("/script/params")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let mut updated = 0;
                let mut next_seq = state.next_seq;
                for doc in state.docs.iter_mut().filter(|d| matches(&query, d)) {
                    if let Some(source) = doc.source.as_object_mut() {
                        source.extend(set.clone());
                    }
                    next_seq += 1;
                    doc.seq_no = next_seq;
                    doc.version += 1;
                    updated += 1;
                }
                state.next_seq = next_seq;
                respond(200, json!({ "updated": updated }))
            }
            BackendRequest::DeleteByQuery { body, .. } => {
                let query = body.get("query").cloned().unwrap_or(Value::Null);
                let before = state.docs.len();
                state.docs.retain(|d| !matches(&query, d));
                respond(200, json!({ "deleted": before - state.docs.len() }))
            }
            BackendRequest::OpenPointInTime { .. } => {
                let id = state.new_pit_id();
                let snapshot = state.docs.clone();
                state.pits.insert(id.clone(), snapshot);
                respond(200, json!({ "pit_id": id }))
            }
            BackendRequest::ClosePointInTime { id } => match state.pits.remove(id) {
                Some(_) => respond(200, json!({ "succeeded": true, "num_freed": 1 })),
                None => respond(404, json!({ "succeeded": false, "num_freed": 0 })),
            },
            BackendRequest::CreateIndex { .. } => {
                if state.index_created {
                    return respond(
                        400,
                        json!({ "error": { "type": "resource_already_exists_exception" } }),
                    );
                }
                state.index_created = true;
                respond(200, json!({ "acknowledged": true }))
            }
            BackendRequest::IndexExists { .. } => {
                if state.index_created {
                    respond(200, Value::Null)
                } else {
                    respond(404, Value::Null)
                }
            }
            BackendRequest::DeleteIndex { .. } => {
                if !state.index_created {
                    return respond(404, json!({ "error": { "type": "index_not_found_exception" } }));
                }
                state.index_created = false;
                state.docs.clear();
                respond(200, json!({ "acknowledged": true }))
            }
            BackendRequest::Refresh { .. } => respond(200, json!({ "_shards": { "failed": 0 } })),
        }
    }

    fn search(&self, state: &mut State, body: &Value) -> BackendResponse {
        state.searches += 1;

        let pit_id = body
            .pointer("/pit/id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let docs = match &pit_id {
            Some(id) => match state.pits.remove(id) {
                Some(snapshot) => snapshot,
                None => {
                    return respond(
                        404,
                        json!({ "error": { "type": "search_context_missing_exception", "reason": "No search context found" } }),
                    )
                }
            },
            None => state.docs.clone(),
        };

        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0);
        let size = body.get("size").and_then(Value::as_u64).unwrap_or(10);
        if pit_id.is_none() && from + size > self.max_window {
            return respond(
                400,
                json!({ "error": { "type": "illegal_argument_exception", "reason": "Result window is too large" } }),
            );
        }

        let query = body.get("query").cloned().unwrap_or(Value::Null);
        let clauses = parse_sort(body.get("sort"));
        let mut matched: Vec<&StoredDoc> = docs.iter().filter(|d| matches(&query, d)).collect();
        if !clauses.is_empty() {
            matched.sort_by(|a, b| compare_keys(&sort_key(a, &clauses), &sort_key(b, &clauses), &clauses));
        }
        let total = matched.len();

        if let Some(after) = body.get("search_after").and_then(Value::as_array) {
            matched.retain(|d| compare_keys(&sort_key(d, &clauses), after, &clauses) == Ordering::Greater);
        }

        let source = body.get("_source").cloned().unwrap_or(Value::Null);
        let with_version = body.get("version") == Some(&json!(true));
        let with_tokens = body.get("seq_no_primary_term") == Some(&json!(true));
        let hits: Vec<Value> = matched
            .iter()
            .skip(from as usize)
            .take(size as usize)
            .map(|d| {
                // search hits only carry what the request asked for
                let mut hit = hit_json(d, &clauses, &source);
                if let Some(hit) = hit.as_object_mut() {
                    if !with_version {
                        hit.remove("_version");
                    }
                    if !with_tokens {
                        hit.remove("_seq_no");
                        hit.remove("_primary_term");
                    }
                }
                hit
            })
            .collect();

        let shards = if state.fail_shards {
            json!({
                "total": 2, "successful": 1, "failed": 1,
                "failures": [{ "shard": 1, "index": INDEX, "reason": { "type": "node_not_connected_exception", "reason": "node left the cluster" } }]
            })
        } else {
            json!({ "total": 1, "successful": 1, "failed": 0 })
        };

        let mut response = json!({
            "took": 1,
            "_shards": shards,
            "hits": { "total": { "value": total, "relation": "eq" }, "hits": hits }
        });
        if body.get("aggs").is_some() || body.get("aggregations").is_some() {
            response["aggregations"] = json!({
                "page": { "value": state.searches },
                "matched": { "value": total }
            });
        }
        if pit_id.is_some() {
            let id = state.new_pit_id();
            state.pits.insert(id.clone(), docs.clone());
            response["pit_id"] = json!(id);
        }
        respond(200, response)
    }
}

impl State {
    fn find(&self, id: &str) -> Option<&StoredDoc> {
        self.docs.iter().find(|d| d.id == id)
    }

    fn new_pit_id(&mut self) -> String {
        self.next_pit += 1;
        format!("pit-{}", self.next_pit)
    }

    fn index_doc(&mut self, id: Option<String>, source: Value, if_seq_no: Option<u64>) -> Value {
        let id = match id {
            Some(id) => id,
            None => {
                self.next_id += 1;
                format!("gen-{}", self.next_id)
            }
        };
        let pos = self.docs.iter().position(|d| d.id == id);
        if let Some(expected) = if_seq_no {
            match pos {
                Some(p) if self.docs[p].seq_no == expected => {}
                _ => return conflict(&id),
            }
        }

        self.next_seq += 1;
        let seq_no = self.next_seq;
        let (doc, status, result) = match pos {
            Some(p) => {
                let doc = &mut self.docs[p];
                doc.version += 1;
                doc.seq_no = seq_no;
                doc.source = source;
                (doc.clone(), 200, "updated")
            }
            None => {
                self.next_order += 1;
                let doc = StoredDoc {
                    id,
                    version: 1,
                    seq_no,
                    order: self.next_order,
                    source,
                };
                self.docs.push(doc.clone());
                (doc, 201, "created")
            }
        };
        item_json(&doc, status, result)
    }

    fn delete_doc(&mut self, id: Option<String>, if_seq_no: Option<u64>) -> Value {
        let Some(id) = id else {
            return json!({ "_index": INDEX, "status": 400, "error": { "type": "action_request_validation_exception", "reason": "id is missing" } });
        };
        let Some(pos) = self.docs.iter().position(|d| d.id == id) else {
            return json!({ "_index": INDEX, "_id": id, "status": 404, "result": "not_found" });
        };
        if if_seq_no.is_some_and(|expected| self.docs[pos].seq_no != expected) {
            return conflict(&id);
        }

        let mut doc = self.docs.remove(pos);
        self.next_seq += 1;
        doc.seq_no = self.next_seq;
        doc.version += 1;
        item_json(&doc, 200, "deleted")
    }

    fn bulk(&mut self, body: &str) -> BackendResponse {
        let lines: Vec<Value> = body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        if self.max_bulk_lines.is_some_and(|max| lines.len() > max) {
            return respond(413, json!({ "error": "Request Entity Too Large" }));
        }

        let mut items = Vec::new();
        let mut errors = false;
        let mut i = 0;
        while i < lines.len() {
            let (action, meta) = lines[i]
                .as_object()
                .and_then(|m| m.iter().next())
                .map(|(k, v)| (k.clone(), v.clone()))
                .unwrap();
            i += 1;
            let id = meta.get("_id").and_then(Value::as_str).map(str::to_string);
            let if_seq_no = meta.get("if_seq_no").and_then(Value::as_u64);

            let item = match action.as_str() {
                "index" | "create" => {
                    let source = lines[i].clone();
                    i += 1;
                    self.index_doc(id, source, if_seq_no)
                }
                "delete" => self.delete_doc(id, if_seq_no),
                other => panic!("unsupported bulk action {}", other),
            };
            if item["status"].as_u64().unwrap_or(500) >= 400 {
                errors = true;
            }
            let mut wrapped = Map::new();
            wrapped.insert(action, item);
            items.push(Value::Object(wrapped));
        }

        respond(200, json!({ "took": 2, "errors": errors, "items": items }))
    }
}

#[async_trait]
impl SearchTransport for FakeBackend {
    async fn send(&self, request: &BackendRequest) -> Result<BackendResponse, SearchStoreError> {
        Ok(self.handle(request))
    }
}

fn respond(status: u16, body: Value) -> BackendResponse {
    let mut response = BackendResponse::new(status, body);
    let length = response.body.to_string().len();
    response
        .headers
        .insert("content-length".to_string(), length.to_string());
    response
}

fn conflict(id: &str) -> Value {
    json!({
        "_index": INDEX,
        "_id": id,
        "status": 409,
        "error": {
            "type": "version_conflict_engine_exception",
            "reason": format!("[{}]: version conflict", id)
        }
    })
}

fn item_json(doc: &StoredDoc, status: u16, result: &str) -> Value {
    json!({
        "_index": INDEX,
        "_id": doc.id,
        "_version": doc.version,
        "_seq_no": doc.seq_no,
        "_primary_term": 1,
        "status": status,
        "result": result
    })
}

fn hit_json(doc: &StoredDoc, clauses: &[Clause], source: &Value) -> Value {
    let mut hit = json!({
        "_index": INDEX,
        "_id": doc.id,
        "_version": doc.version,
        "_seq_no": doc.seq_no,
        "_primary_term": 1,
        "_score": 1.0
    });
    match source {
        Value::Bool(false) => {}
        Value::Array(fields) => {
            let picked: Map<String, Value> = fields
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|f| doc.source.get(f).map(|v| (f.to_string(), v.clone())))
                .collect();
            hit["_source"] = Value::Object(picked);
        }
        _ => hit["_source"] = doc.source.clone(),
    }
    if !clauses.is_empty() {
        hit["sort"] = Value::Array(sort_key(doc, clauses));
    }
    hit
}

fn matches(query: &Value, doc: &StoredDoc) -> bool {
    let Some(query) = query.as_object() else {
        return true;
    };
    if let Some(term) = query.get("term").and_then(Value::as_object) {
        return term.iter().all(|(field, expected)| {
            let expected = expected.get("value").unwrap_or(expected);
            doc.source.get(field) == Some(expected)
        });
    }
    if let Some(ids) = query
        .get("ids")
        .and_then(|ids| ids.get("values"))
        .and_then(Value::as_array)
    {
        return ids.iter().any(|id| id.as_str() == Some(doc.id.as_str()));
    }
    if let Some(range) = query.get("range").and_then(Value::as_object) {
        return range.iter().all(|(field, bounds)| {
            let Some(value) = doc.source.get(field).and_then(Value::as_f64) else {
                return false;
            };
            let bound = |name: &str| bounds.get(name).and_then(Value::as_f64);
            bound("gte").map_or(true, |b| value >= b)
                && bound("gt").map_or(true, |b| value > b)
                && bound("lte").map_or(true, |b| value <= b)
                && bound("lt").map_or(true, |b| value < b)
        });
    }
    true
}

fn parse_sort(sort: Option<&Value>) -> Vec<Clause> {
    let Some(Value::Array(clauses)) = sort else {
        return Vec::new();
    };
    clauses
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|clause| clause.iter().next())
        .map(|(field, options)| {
            let desc = options.get("order").and_then(Value::as_str) == Some("desc");
            let missing = options.get("missing").cloned().unwrap_or(Value::Null);
            (field.clone(), desc, missing)
        })
        .collect()
}

fn sort_key(doc: &StoredDoc, clauses: &[Clause]) -> Vec<Value> {
    clauses
        .iter()
        .map(|(field, _, missing)| match field.as_str() {
            "_doc" => json!(doc.order),
            "_score" => json!(1.0),
            _ => doc
                .source
                .get(field)
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| missing.clone()),
        })
        .collect()
}

fn compare_keys(a: &[Value], b: &[Value], clauses: &[Clause]) -> Ordering {
    for ((left, right), (_, desc, _)) in a.iter().zip(b).zip(clauses) {
        let ordering = compare_values(left, right);
        let ordering = if *desc { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(_), Value::String(_)) => Ordering::Less,
        (Value::String(_), Value::Number(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// A `Note` collection over `backend` with the given page limit.
pub fn notes(backend: &Arc<FakeBackend>, page_limit: u64) -> Model<Note> {
    let config = StoreConfig::with_retry(RetryPolicy {
        page_limit,
        ..RetryPolicy::default()
    })
    .with_default_page_size(4);
    let layer = CallLayer::new(backend.clone(), config);
    Model::new(ModelConfig::new("acme", "notes"), layer).unwrap()
}

/// Note numbers of a typed window, in order.
pub fn numbers<'a>(items: impl IntoIterator<Item = &'a search_store_repository::Entity<Note>>) -> Vec<i64> {
    items.into_iter().map(|e| e.source.n).collect()
}
