//! `$ref`/`allOf` expansion with a bidirectional reference graph.
//!
//! The graph keeps `referred_to`/`referred_in` symmetric after every
//! mutation and caches resolved documents, so re-resolving a changed
//! subset never re-expands unrelated nodes.

use std::collections::{BTreeSet, HashMap};

use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::names::normalize_name;

/// Resolver state shared by all documents of one resource.
#[derive(Debug, Default)]
pub struct SchemaGraph {
    resolved: HashMap<String, Value>,
    referred_to: HashMap<String, BTreeSet<String>>,
    referred_in: HashMap<String, BTreeSet<String>>,
}

impl SchemaGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fully expand `raw` against `store`, caching every document resolved
    /// along the way and recording the reference edges it makes.
    pub fn resolve(
        &mut self,
        name: &str,
        raw: &Value,
        store: &HashMap<String, Value>,
    ) -> Result<Value, SchemaError> {
        if !raw.is_object() {
            return Err(SchemaError::Format {
                name: name.to_string(),
            });
        }
        let mut stack = vec![name.to_string()];
        let resolved = self.resolve_node(name, raw, store, &mut stack)?;
        self.resolved.insert(name.to_string(), resolved.clone());
        self.repair_symmetry();
        Ok(resolved)
    }

    fn resolve_node(
        &mut self,
        owner: &str,
        node: &Value,
        store: &HashMap<String, Value>,
        stack: &mut Vec<String>,
    ) -> Result<Value, SchemaError> {
        match node {
            Value::Object(map) => {
                if let Some(Value::String(target)) = map.get("$ref") {
                    return self.resolve_ref(owner, target, store, stack);
                }
                if let Some(Value::Array(branches)) = map.get("allOf") {
                    let mut merged = Map::new();
                    for branch in branches {
                        let resolved = self.resolve_node(owner, branch, store, stack)?;
                        merge_branch(&mut merged, &resolved);
                    }
                    return Ok(Value::Object(merged));
                }
                let mut out = Map::new();
                for (key, value) in map {
                    out.insert(key.clone(), self.resolve_node(owner, value, store, stack)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_node(owner, item, store, stack)?);
                }
                Ok(Value::Array(out))
            }
            leaf => Ok(leaf.clone()),
        }
    }

    fn resolve_ref(
        &mut self,
        owner: &str,
        target: &str,
        store: &HashMap<String, Value>,
        stack: &mut Vec<String>,
    ) -> Result<Value, SchemaError> {
        let target = normalize_name(target);
        self.record_edge(owner, &target);

        if let Some(cached) = self.resolved.get(&target) {
            return Ok(cached.clone());
        }
        if stack.iter().any(|n| n == &target) {
            return Err(SchemaError::Circular { name: target });
        }
        let raw = store
            .get(&target)
            .cloned()
            .ok_or_else(|| SchemaError::Reference {
                name: owner.to_string(),
                missing: target.clone(),
            })?;
        if !raw.is_object() {
            return Err(SchemaError::Format {
                name: target.clone(),
            });
        }

        stack.push(target.clone());
        let resolved = self.resolve_node(&target, &raw, store, stack)?;
        stack.pop();
        self.resolved.insert(target, resolved.clone());
        Ok(resolved)
    }

    fn record_edge(&mut self, owner: &str, target: &str) {
        self.referred_to
            .entry(owner.to_string())
            .or_default()
            .insert(target.to_string());
        self.referred_in
            .entry(target.to_string())
            .or_default()
            .insert(owner.to_string());
    }

    /// Guard against partial updates from earlier incremental runs: every
    /// `referred_to` edge gets a matching `referred_in` edge and vice versa.
    pub fn repair_symmetry(&mut self) {
        let forward: Vec<(String, String)> = self
            .referred_to
            .iter()
            .flat_map(|(a, tos)| tos.iter().map(move |b| (a.clone(), b.clone())))
            .collect();
        for (a, b) in forward {
            self.referred_in.entry(b).or_default().insert(a);
        }
        let backward: Vec<(String, String)> = self
            .referred_in
            .iter()
            .flat_map(|(b, ins)| ins.iter().map(move |a| (a.clone(), b.clone())))
            .collect();
        for (a, b) in backward {
            self.referred_to.entry(a).or_default().insert(b);
        }
    }

    /// Resolved document for `name`, if present.
    #[must_use]
    pub fn resolved(&self, name: &str) -> Option<&Value> {
        self.resolved.get(name)
    }

    /// Names that directly reference `name`.
    #[must_use]
    pub fn referred_in(&self, name: &str) -> BTreeSet<String> {
        self.referred_in.get(name).cloned().unwrap_or_default()
    }

    /// Names that `name` directly references.
    #[must_use]
    pub fn referred_to(&self, name: &str) -> BTreeSet<String> {
        self.referred_to.get(name).cloned().unwrap_or_default()
    }

    /// Transitive set of nodes that reference `name`, directly or not.
    #[must_use]
    pub fn dependents_closure(&self, name: &str) -> BTreeSet<String> {
        let mut closure = BTreeSet::new();
        let mut frontier = vec![name.to_string()];
        while let Some(current) = frontier.pop() {
            for dependent in self.referred_in(&current) {
                if closure.insert(dependent.clone()) {
                    frontier.push(dependent);
                }
            }
        }
        closure
    }

    /// Drop the resolved form and outgoing edges of `name` ahead of a
    /// re-resolution; incoming edges stay, they belong to the referrers.
    pub fn invalidate(&mut self, name: &str) {
        self.resolved.remove(name);
        if let Some(targets) = self.referred_to.remove(name) {
            for target in targets {
                if let Some(ins) = self.referred_in.get_mut(&target) {
                    ins.remove(name);
                }
            }
        }
    }

    /// Remove `name` and every edge touching it.
    pub fn unlink(&mut self, name: &str) {
        self.invalidate(name);
        if let Some(referrers) = self.referred_in.remove(name) {
            for referrer in referrers {
                if let Some(tos) = self.referred_to.get_mut(&referrer) {
                    tos.remove(name);
                }
            }
        }
    }

    /// Edge-count snapshot, used to detect graph growth in tests.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.referred_to.values().map(BTreeSet::len).sum()
    }
}

/// Collect every `$ref` target (normalized) mentioned anywhere in `doc`.
#[must_use]
pub fn collect_refs(doc: &Value) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    collect_refs_into(doc, &mut refs);
    refs
}

fn collect_refs_into(node: &Value, refs: &mut BTreeSet<String>) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("$ref") {
                refs.insert(normalize_name(target));
            }
            for value in map.values() {
                collect_refs_into(value, refs);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs_into(item, refs);
            }
        }
        _ => {}
    }
}

/// Merge one resolved `allOf` branch into the accumulator: `required`
/// arrays concatenate in branch order, `properties` deep-merge key by
/// key, every other key is last-write-wins.
fn merge_branch(merged: &mut Map<String, Value>, branch: &Value) {
    let Some(branch) = branch.as_object() else {
        return;
    };
    for (key, value) in branch {
        match key.as_str() {
            "required" => {
                let target = merged
                    .entry("required")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let (Some(target), Some(extra)) = (target.as_array_mut(), value.as_array()) {
                    target.extend(extra.iter().cloned());
                }
            }
            "properties" => {
                let target = merged
                    .entry("properties")
                    .or_insert_with(|| Value::Object(Map::new()));
                deep_merge_props(target, value);
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Recursive object merge; non-object leaves are overwritten by `source`.
fn deep_merge_props(target: &mut Value, source: &Value) {
    let (Some(target_map), Some(source_map)) = (target.as_object_mut(), source.as_object()) else {
        *target = source.clone();
        return;
    };
    for (key, value) in source_map {
        match target_map.get_mut(key) {
            Some(existing) if existing.is_object() && value.is_object() => {
                deep_merge_props(existing, value);
            }
            _ => {
                target_map.insert(key.clone(), value.clone());
            }
        }
    }
}
