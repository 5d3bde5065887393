//! Request models compiled from resolved schemas.
//!
//! [`GeneratedModel::compile`] turns a resolved version schema into a
//! typed field tree; [`GeneratedModel::validate`] checks a provisioning
//! payload against it and reports every violation with a dotted path.
//! Compilation never fails: any construct the compiler does not
//! understand degrades to an accept-anything field.

use serde_json::Value;
use url::Url;

/// Pattern that marks a string property as a URL field.
const URL_PATTERN: &str = "^https?://";

/// One violation found while validating a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Dotted path into the payload, e.g. `spec.replicas`.
    pub path: String,
    pub message: String,
}

impl FieldIssue {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Compiled type of one schema property.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Url,
    Enum(Vec<Value>),
    Array(Box<FieldType>),
    Object(ObjectModel),
    Nullable(Box<FieldType>),
    /// Object with no declared properties, any string-keyed map passes.
    Map,
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldModel {
    pub name: String,
    pub required: bool,
    pub ty: FieldType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectModel {
    /// Model name, nested objects are named `{parent}_{Field}`.
    pub name: String,
    pub fields: Vec<FieldModel>,
}

/// Validator for one schema version's provisioning payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedModel {
    version: String,
    root: ObjectModel,
}

impl GeneratedModel {
    /// Compile a resolved schema into a model named after its version.
    #[must_use]
    pub fn compile(version: &str, schema: &Value) -> Self {
        let root = compile_object(version, schema);
        Self {
            version: version.to_string(),
            root,
        }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn root(&self) -> &ObjectModel {
        &self.root
    }

    /// Check `payload` against the model. Unknown extra fields pass;
    /// every declared field that is present must match its type and
    /// every required field must be present.
    pub fn validate(&self, payload: &Value) -> Result<(), Vec<FieldIssue>> {
        let mut issues = Vec::new();
        validate_object(&self.root, payload, "", &mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

fn compile_object(name: &str, schema: &Value) -> ObjectModel {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut fields = Vec::new();
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (field_name, prop) in props {
            fields.push(FieldModel {
                name: field_name.clone(),
                required: required.contains(&field_name.as_str()),
                ty: compile_type(name, field_name, prop),
            });
        }
    }
    ObjectModel {
        name: name.to_string(),
        fields,
    }
}

fn compile_type(parent: &str, field: &str, prop: &Value) -> FieldType {
    let Some(prop) = prop.as_object() else {
        return FieldType::Any;
    };

    if let Some(Value::Array(values)) = prop.get("enum") {
        return FieldType::Enum(values.clone());
    }

    match prop.get("type") {
        Some(Value::String(ty)) => compile_named_type(parent, field, ty, prop),
        // A type list marks the field nullable when "null" is one of the
        // entries and exactly one concrete type remains.
        Some(Value::Array(types)) => {
            let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
            let concrete: Vec<&str> = names.iter().filter(|t| **t != "null").copied().collect();
            match (names.contains(&"null"), concrete.as_slice()) {
                (true, [only]) => FieldType::Nullable(Box::new(compile_named_type(
                    parent, field, only, prop,
                ))),
                _ => FieldType::Any,
            }
        }
        _ => FieldType::Any,
    }
}

fn compile_named_type(parent: &str, field: &str, ty: &str, prop: &serde_json::Map<String, Value>) -> FieldType {
    match ty {
        "string" => match prop.get("pattern").and_then(Value::as_str) {
            Some(URL_PATTERN) => FieldType::Url,
            _ => FieldType::String,
        },
        "integer" => FieldType::Integer,
        "number" => FieldType::Number,
        "boolean" => FieldType::Boolean,
        "array" => {
            let element = match prop.get("items") {
                Some(items) => compile_type(parent, field, items),
                None => FieldType::Any,
            };
            FieldType::Array(Box::new(element))
        }
        "object" => {
            if prop.contains_key("properties") {
                let nested_name = format!("{parent}_{}", capitalize(field));
                FieldType::Object(compile_object(&nested_name, &Value::Object(prop.clone())))
            } else {
                FieldType::Map
            }
        }
        _ => FieldType::Any,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn validate_object(model: &ObjectModel, value: &Value, path: &str, issues: &mut Vec<FieldIssue>) {
    let Some(map) = value.as_object() else {
        issues.push(FieldIssue::new(
            if path.is_empty() { "." } else { path },
            "expected an object",
        ));
        return;
    };
    for field in &model.fields {
        let field_path = join_path(path, &field.name);
        match map.get(&field.name) {
            Some(value) => validate_type(&field.ty, value, &field_path, issues),
            None if field.required => {
                issues.push(FieldIssue::new(&field_path, "required field is missing"));
            }
            None => {}
        }
    }
}

fn validate_type(ty: &FieldType, value: &Value, path: &str, issues: &mut Vec<FieldIssue>) {
    match ty {
        FieldType::Any => {}
        FieldType::String => {
            if !value.is_string() {
                issues.push(FieldIssue::new(path, "expected a string"));
            }
        }
        FieldType::Integer => {
            if !value.is_i64() && !value.is_u64() {
                issues.push(FieldIssue::new(path, "expected an integer"));
            }
        }
        FieldType::Number => {
            if !value.is_number() {
                issues.push(FieldIssue::new(path, "expected a number"));
            }
        }
        FieldType::Boolean => {
            if !value.is_boolean() {
                issues.push(FieldIssue::new(path, "expected a boolean"));
            }
        }
        FieldType::Url => match value.as_str() {
            Some(s) => match Url::parse(s) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                _ => issues.push(FieldIssue::new(path, "expected an http(s) URL")),
            },
            None => issues.push(FieldIssue::new(path, "expected an http(s) URL string")),
        },
        FieldType::Enum(allowed) => {
            if !allowed.contains(value) {
                let rendered: Vec<String> = allowed.iter().map(Value::to_string).collect();
                issues.push(FieldIssue::new(
                    path,
                    format!("expected one of {}", rendered.join(", ")),
                ));
            }
        }
        FieldType::Array(element) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(element, item, &format!("{path}[{i}]"), issues);
                }
            }
            None => issues.push(FieldIssue::new(path, "expected an array")),
        },
        FieldType::Object(model) => validate_object(model, value, path, issues),
        FieldType::Nullable(inner) => {
            if !value.is_null() {
                validate_type(inner, value, path, issues);
            }
        }
        FieldType::Map => {
            if !value.is_object() {
                issues.push(FieldIssue::new(path, "expected an object"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model(schema: Value) -> GeneratedModel {
        GeneratedModel::compile("1.0.0", &schema)
    }

    #[test]
    fn scalar_types_validate() {
        let m = model(json!({
            "required": ["name", "replicas"],
            "properties": {
                "name": {"type": "string"},
                "replicas": {"type": "integer"},
                "weight": {"type": "number"},
                "enabled": {"type": "boolean"},
            }
        }));
        assert!(m
            .validate(&json!({"name": "a", "replicas": 3, "weight": 0.5, "enabled": true}))
            .is_ok());

        let issues = m
            .validate(&json!({"name": 7, "replicas": "three"}))
            .unwrap_err();
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["name", "replicas"]);
    }

    #[test]
    fn missing_required_field_is_reported() {
        let m = model(json!({
            "required": ["name"],
            "properties": {"name": {"type": "string"}}
        }));
        let issues = m.validate(&json!({})).unwrap_err();
        assert_eq!(issues[0].path, "name");
        assert_eq!(issues[0].message, "required field is missing");
    }

    #[test]
    fn nullable_type_lists_accept_null() {
        let m = model(json!({
            "properties": {"owner": {"type": ["string", "null"]}}
        }));
        assert!(m.validate(&json!({"owner": null})).is_ok());
        assert!(m.validate(&json!({"owner": "team-a"})).is_ok());
        assert!(m.validate(&json!({"owner": 3})).is_err());
    }

    #[test]
    fn enums_restrict_values() {
        let m = model(json!({
            "properties": {"tier": {"enum": ["gold", "silver"]}}
        }));
        assert!(m.validate(&json!({"tier": "gold"})).is_ok());
        let issues = m.validate(&json!({"tier": "bronze"})).unwrap_err();
        assert!(issues[0].message.contains("\"gold\""));
    }

    #[test]
    fn url_pattern_compiles_to_url_field() {
        let m = model(json!({
            "properties": {"endpoint": {"type": "string", "pattern": "^https?://"}}
        }));
        assert!(m.validate(&json!({"endpoint": "https://example.com/x"})).is_ok());
        assert!(m.validate(&json!({"endpoint": "ftp://example.com"})).is_err());
        assert!(m.validate(&json!({"endpoint": "not a url"})).is_err());
    }

    #[test]
    fn nested_objects_get_parent_prefixed_names() {
        let m = model(json!({
            "properties": {
                "spec": {
                    "type": "object",
                    "required": ["size"],
                    "properties": {"size": {"type": "integer"}}
                }
            }
        }));
        let spec = m
            .root()
            .fields
            .iter()
            .find(|f| f.name == "spec")
            .unwrap();
        match &spec.ty {
            FieldType::Object(nested) => assert_eq!(nested.name, "1.0.0_Spec"),
            other => panic!("expected nested object model, got {other:?}"),
        }

        let issues = m.validate(&json!({"spec": {}})).unwrap_err();
        assert_eq!(issues[0].path, "spec.size");
    }

    #[test]
    fn arrays_validate_each_element() {
        let m = model(json!({
            "properties": {"tags": {"type": "array", "items": {"type": "string"}}}
        }));
        assert!(m.validate(&json!({"tags": ["a", "b"]})).is_ok());
        let issues = m.validate(&json!({"tags": ["a", 2]})).unwrap_err();
        assert_eq!(issues[0].path, "tags[1]");
    }

    #[test]
    fn mixed_type_lists_fall_back_to_any() {
        let m = model(json!({
            "properties": {"x": {"type": ["string", "integer"]}}
        }));
        assert!(m.validate(&json!({"x": "s"})).is_ok());
        assert!(m.validate(&json!({"x": 1})).is_ok());
        assert!(m.validate(&json!({"x": {"deep": true}})).is_ok());
    }

    #[test]
    fn object_without_properties_accepts_any_map() {
        let m = model(json!({
            "properties": {"labels": {"type": "object"}}
        }));
        assert!(m.validate(&json!({"labels": {"a": "b"}})).is_ok());
        assert!(m.validate(&json!({"labels": "nope"})).is_err());
    }

    #[test]
    fn extra_fields_are_ignored() {
        let m = model(json!({
            "properties": {"name": {"type": "string"}}
        }));
        assert!(m.validate(&json!({"name": "a", "unknown": 42})).is_ok());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let m = model(json!({"properties": {}}));
        let issues = m.validate(&json!([1, 2])).unwrap_err();
        assert_eq!(issues[0].path, ".");
    }
}
