//! Cluster namespace allow-list registration.
//!
//! Each cluster has a reconciler application holding its configuration,
//! including the list of namespaces the reconciler will deploy into. New
//! namespaces must be appended there and synced before the first
//! application targeting them is created.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use berth_clients::Reconciler;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::ProvisionError;

const ALLOWED_NAMESPACES_KEY: &str = "allowedNamespaces";

/// Cached cluster-to-namespaces membership, refreshed from the
/// reconciler's stored cluster configuration on a miss.
pub struct ClusterRegistry {
    reconciler: Arc<dyn Reconciler>,
    project: String,
    control_namespace: String,
    // One lock for all clusters: registration is rare and the
    // read-modify-write against the reconciler must not interleave.
    cache: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl ClusterRegistry {
    pub fn new(
        reconciler: Arc<dyn Reconciler>,
        project: impl Into<String>,
        control_namespace: impl Into<String>,
    ) -> Self {
        Self {
            reconciler,
            project: project.into(),
            control_namespace: control_namespace.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn cluster_app_name(cluster: &str) -> String {
        format!("{cluster}-cluster-config")
    }

    /// Make sure `namespace` is on `cluster`'s allow-list, appending and
    /// syncing the cluster application when it is not. Returns whether a
    /// registration was performed.
    pub async fn ensure_namespace(
        &self,
        cluster: &str,
        namespace: &str,
    ) -> Result<bool, ProvisionError> {
        let mut cache = self.cache.lock().await;
        if cache
            .get(cluster)
            .is_some_and(|namespaces| namespaces.contains(namespace))
        {
            return Ok(false);
        }

        let app = Self::cluster_app_name(cluster);
        let raw = self.reconciler.get_application_values(&app).await?;
        let mut values: Value =
            serde_yaml::from_str(&raw).map_err(|e| ProvisionError::Serialize {
                detail: e.to_string(),
            })?;
        if values.is_null() {
            values = json!({});
        }
        let Some(root) = values.as_object_mut() else {
            return Err(ProvisionError::Serialize {
                detail: format!("cluster config for '{cluster}' is not a mapping"),
            });
        };

        let list = root
            .entry(ALLOWED_NAMESPACES_KEY)
            .or_insert_with(|| Value::Array(Vec::new()));
        let mut namespaces: BTreeSet<String> = list
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let registered = namespaces.insert(namespace.to_string());
        if registered {
            *list = Value::Array(namespaces.iter().cloned().map(Value::String).collect());
            self.reconciler
                .patch_application_values(&values, &app, &self.control_namespace, &self.project)
                .await?;
            self.reconciler.sync_application(&app).await?;
            info!(
                cluster = %cluster,
                namespace = %namespace,
                "namespace registered on cluster allow-list"
            );
        }
        cache.insert(cluster.to_string(), namespaces);
        Ok(registered)
    }
}
