//! OpenAPI description generation.
//!
//! The document is rebuilt wholesale from the current route table on
//! every structural change, never patched incrementally, so retracted
//! operations disappear from it.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::table::{Operation, RouteTable};

/// Build the path items for one resource from its route table. Paths are
/// fully qualified under the resource mount.
#[must_use]
pub fn describe_resource(
    resource: &str,
    table: &RouteTable,
    definitions: &HashMap<String, Value>,
) -> Value {
    let mut paths = Map::new();
    for entry in table.entries() {
        let path = format!("/v1/{resource}{}", entry.path.trim_end_matches('/'));
        let item = paths
            .entry(path)
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(item) = item.as_object_mut() else {
            continue;
        };
        let method = entry.method.as_str().to_lowercase();
        item.insert(method, operation_object(resource, &entry.operation, definitions));
    }
    json!({ "paths": paths })
}

/// Merge per-resource descriptions into one OpenAPI 3 document.
#[must_use]
pub fn merge_descriptions<'a>(descriptions: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut paths = Map::new();
    for description in descriptions {
        if let Some(map) = description.get("paths").and_then(Value::as_object) {
            for (path, item) in map {
                paths.insert(path.clone(), item.clone());
            }
        }
    }
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "berth provisioning API",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": paths,
    })
}

fn operation_object(
    resource: &str,
    operation: &Operation,
    definitions: &HashMap<String, Value>,
) -> Value {
    let mut object = Map::new();
    object.insert("summary".to_string(), json!(operation.summary()));
    object.insert("tags".to_string(), json!([resource]));

    match operation {
        Operation::Status | Operation::ReadConfig | Operation::DeleteInstance => {
            object.insert(
                "parameters".to_string(),
                json!([
                    {"name": "cluster", "in": "query", "required": true, "schema": {"type": "string"}},
                    {"name": "namespace", "in": "query", "required": true, "schema": {"type": "string"}},
                    {"name": "name", "in": "query", "required": true, "schema": {"type": "string"}},
                ]),
            );
        }
        Operation::CanRemove => {
            object.insert(
                "requestBody".to_string(),
                json!({
                    "required": true,
                    "content": {"application/json": {"schema": {
                        "type": "object",
                        "required": ["schemas"],
                        "properties": {"schemas": {"type": "array", "items": {"type": "string"}}},
                    }}},
                }),
            );
        }
        Operation::Create { version } | Operation::Update { version } => {
            let schema = definitions
                .get(version)
                .cloned()
                .unwrap_or_else(|| json!({"type": "object"}));
            object.insert(
                "requestBody".to_string(),
                json!({
                    "required": true,
                    "content": {"application/json": {"schema": schema}},
                }),
            );
        }
        Operation::Definition { .. } => {}
    }
    Value::Object(object)
}
