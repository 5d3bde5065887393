//! Route lifecycle management for one resource.
//!
//! Keeps the route table 1:1 with the engine's valid semantic-version
//! schemas, the compiled model cache fresh, and the API description
//! regenerated wholesale after every structural change.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use berth_schema::{GeneratedModel, SchemaChangeListener, SchemaSyncEngine, TickSummary};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

use crate::describe;
use crate::table::{general_entries, version_entries, RouteTable};

pub struct RouteLifecycleManager {
    resource: String,
    engine: Arc<RwLock<SchemaSyncEngine>>,
    table: RwLock<Arc<RouteTable>>,
    models: RwLock<HashMap<String, Arc<GeneratedModel>>>,
    description: RwLock<Arc<Value>>,
}

impl RouteLifecycleManager {
    pub fn new(resource: impl Into<String>, engine: Arc<RwLock<SchemaSyncEngine>>) -> Self {
        Self {
            resource: resource.into(),
            engine,
            table: RwLock::new(Arc::new(RouteTable::new())),
            models: RwLock::new(HashMap::new()),
            description: RwLock::new(Arc::new(Value::Null)),
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Current table snapshot. Handlers hold the `Arc`, never the lock.
    pub async fn table(&self) -> Arc<RouteTable> {
        Arc::clone(&*self.table.read().await)
    }

    /// Current API description document.
    pub async fn description(&self) -> Arc<Value> {
        Arc::clone(&*self.description.read().await)
    }

    pub fn engine(&self) -> &Arc<RwLock<SchemaSyncEngine>> {
        &self.engine
    }

    /// Reconcile the route table with the engine's current version set.
    /// Safe to call repeatedly; registration is idempotent by
    /// `(path, method)` and stale versions lose exactly their own routes.
    pub async fn generate_routes(&self) {
        let engine = self.engine.read().await;
        let versions: BTreeSet<String> = engine.versions().into_iter().collect();
        let definitions: HashMap<String, Value> = versions
            .iter()
            .filter_map(|v| engine.resolved(v).map(|doc| (v.clone(), doc.clone())))
            .collect();
        drop(engine);

        let mut table = (**self.table.read().await).clone();
        let mut added = 0usize;
        let mut removed = 0usize;

        for entry in general_entries() {
            if table.insert_if_absent(entry) {
                added += 1;
            }
        }
        for version in &versions {
            for entry in version_entries(version) {
                if table.insert_if_absent(entry) {
                    added += 1;
                }
            }
        }

        let stale: Vec<String> = table
            .versions()
            .into_iter()
            .filter(|v| !versions.contains(v))
            .collect();
        for version in &stale {
            removed += table.remove_version(version);
        }
        if !stale.is_empty() {
            let mut models = self.models.write().await;
            for version in &stale {
                models.remove(version);
            }
        }

        if added > 0 || removed > 0 {
            info!(
                resource = %self.resource,
                added,
                removed,
                versions = versions.len(),
                "route table updated"
            );
        }
        let description = describe::describe_resource(&self.resource, &table, &definitions);
        *self.table.write().await = Arc::new(table);
        *self.description.write().await = Arc::new(description);
    }

    /// Compiled model for one version, built on first use and cached
    /// until the version's resolved schema changes.
    pub async fn model_for(&self, version: &str) -> Option<Arc<GeneratedModel>> {
        if let Some(model) = self.models.read().await.get(version) {
            return Some(Arc::clone(model));
        }
        let resolved = self.engine.read().await.resolved(version)?.clone();
        let model = Arc::new(GeneratedModel::compile(version, &resolved));
        self.models
            .write()
            .await
            .insert(version.to_string(), Arc::clone(&model));
        Some(model)
    }
}

#[async_trait]
impl SchemaChangeListener for RouteLifecycleManager {
    async fn schemas_changed(&self, _resource: &str, summary: &TickSummary) {
        {
            let mut models = self.models.write().await;
            for name in summary.modified.iter().chain(summary.removed.iter()) {
                models.remove(name);
            }
        }
        self.generate_routes().await;
    }
}
