//! OpenSearch index settings for collections.

use serde_json::{json, Map, Value};

use search_store_shared::ModelConfig;

/// Settings used when a collection does not bring its own.
///
/// - 1 primary shard
/// - 1 replica for redundancy
pub fn default_index_settings() -> Value {
    json!({
        "number_of_shards": 1,
        "number_of_replicas": 1
    })
}

/// Body of the create-index request for a collection.
///
/// `ModelConfig.mappings` may be a full body (`settings` and/or `mappings`) or
/// a bare mapping object. The collection alias is always attached so the
/// versioned index is reachable through it.
pub fn create_index_body(config: &ModelConfig) -> Value {
    let mut body = Map::new();

    match &config.mappings {
        Some(Value::Object(map)) if map.contains_key("settings") || map.contains_key("mappings") => {
            body.extend(map.clone());
        }
        Some(mappings) => {
            body.insert("mappings".to_string(), mappings.clone());
        }
        None => {}
    }
    body.entry("settings")
        .or_insert_with(default_index_settings);

    let mut aliases = match body.remove("aliases") {
        Some(Value::Object(aliases)) => aliases,
        _ => Map::new(),
    };
    aliases.insert(config.alias(), json!({}));
    body.insert("aliases".to_string(), Value::Object(aliases));

    Value::Object(body)
}
