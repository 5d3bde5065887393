//! Upstream schema synchronization.
//!
//! One [`SchemaSyncEngine`] per resource owns the raw and resolved schema
//! sets and reconciles them against the config store: a full load at
//! startup, then incremental diffs between commit markers on every poll.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use berth_clients::{ChangeStatus, GitStore};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::SchemaError;
use crate::names::{is_semver, normalize_name};
use crate::resolver::SchemaGraph;

/// What one sync tick changed, by normalized schema name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl TickSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Receiver for schema-set changes, notified from the sync loop.
#[async_trait]
pub trait SchemaChangeListener: Send + Sync {
    async fn schemas_changed(&self, resource: &str, summary: &TickSummary);
}

/// Authoritative schema set for one resource.
pub struct SchemaSyncEngine {
    resource: String,
    git: Arc<dyn GitStore>,
    schemas_path: String,
    raw: HashMap<String, Value>,
    graph: SchemaGraph,
    marker: Option<String>,
}

impl SchemaSyncEngine {
    pub fn new(resource: impl Into<String>, git: Arc<dyn GitStore>, schemas_path: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            git,
            schemas_path: schemas_path.into(),
            raw: HashMap::new(),
            graph: SchemaGraph::new(),
            marker: None,
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Full load of the schema directory. The commit marker is taken
    /// before listing, so anything committed mid-load is replayed by the
    /// next tick instead of being lost.
    pub async fn load_all(&mut self) -> Result<(), SchemaError> {
        let head = self.git.head().await?;
        let entries = self.git.list_dir(&self.schemas_path).await?;

        for (name, path) in entries {
            if !name.ends_with(".json") {
                continue;
            }
            if let Err(err) = self.load_one(&name, &path).await {
                warn!(
                    resource = %self.resource,
                    schema = %name,
                    error = %err,
                    "skipping schema that failed to load"
                );
            }
        }
        self.resolve_pending();
        self.marker = Some(head);

        info!(
            resource = %self.resource,
            versions = self.versions().len(),
            "schema set loaded"
        );
        Ok(())
    }

    async fn load_one(&mut self, filename: &str, path: &str) -> Result<(), SchemaError> {
        let doc = self.fetch_doc(filename, path).await?;
        self.raw.insert(normalize_name(filename), doc);
        Ok(())
    }

    async fn fetch_doc(&self, filename: &str, path: &str) -> Result<Value, SchemaError> {
        let content = self.git.get_file_content(path).await?;
        serde_json::from_str(&content).map_err(|e| SchemaError::Parse {
            name: filename.to_string(),
            detail: e.to_string(),
        })
    }

    /// Resolve every raw document that has no resolved form yet, returning
    /// the names that resolved. Failures are logged and left raw, so a
    /// document whose reference arrives in a later tick resolves then.
    fn resolve_pending(&mut self) -> Vec<String> {
        let pending: Vec<String> = self
            .raw
            .keys()
            .filter(|name| self.graph.resolved(name).is_none())
            .cloned()
            .collect();
        let mut resolved = Vec::new();
        for name in pending {
            let doc = self.raw[&name].clone();
            match self.graph.resolve(&name, &doc, &self.raw) {
                Ok(_) => resolved.push(name),
                Err(err) => {
                    warn!(
                        resource = %self.resource,
                        schema = %name,
                        error = %err,
                        "schema left unresolved"
                    );
                }
            }
        }
        resolved
    }

    /// Published version names, ascending.
    #[must_use]
    pub fn versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self
            .raw
            .keys()
            .filter(|name| is_semver(name) && self.graph.resolved(name).is_some())
            .cloned()
            .collect();
        versions.sort();
        versions
    }

    /// Resolved document for a version or base schema.
    #[must_use]
    pub fn resolved(&self, name: &str) -> Option<&Value> {
        self.graph.resolved(name)
    }

    /// Whether `name` could be removed alongside `batch`: every name that
    /// directly refers to it must itself be in the batch. The second
    /// element carries the refusal reason.
    #[must_use]
    pub fn can_remove(&self, name: &str, batch: &BTreeSet<String>) -> (bool, Option<String>) {
        let blockers: Vec<String> = self
            .graph
            .referred_in(name)
            .into_iter()
            .filter(|dep| !batch.contains(dep))
            .collect();
        if blockers.is_empty() {
            (true, None)
        } else {
            (false, Some(format!("still referred in: {}", blockers.join(", "))))
        }
    }

    /// One incremental reconciliation pass against the config store.
    pub async fn sync_tick(&mut self) -> Result<TickSummary, SchemaError> {
        let head = self.git.head().await?;
        let Some(marker) = self.marker.clone() else {
            self.load_all().await?;
            return Ok(TickSummary::default());
        };
        if marker == head {
            return Ok(TickSummary::default());
        }

        let changes = self
            .git
            .get_changed_files(&self.schemas_path, &marker, &head)
            .await?;

        let mut summary = TickSummary::default();
        let removed_batch: BTreeSet<String> = changes
            .iter()
            .filter(|c| c.status == ChangeStatus::Removed)
            .map(|c| normalize_name(&c.filename))
            .collect();
        let mut modified_closure: BTreeSet<String> = BTreeSet::new();
        let mut staged: Vec<(String, ChangeStatus, Value)> = Vec::new();

        for change in &changes {
            if !change.filename.ends_with(".json") {
                continue;
            }
            let name = normalize_name(&change.filename);
            match change.status {
                ChangeStatus::Removed => {
                    let (ok, reason) = self.can_remove(&name, &removed_batch);
                    if !ok {
                        warn!(
                            resource = %self.resource,
                            schema = %name,
                            reason = reason.as_deref().unwrap_or(""),
                            "upstream removed a schema that is still referenced, keeping it"
                        );
                        continue;
                    }
                    self.raw.remove(&name);
                    self.graph.unlink(&name);
                    summary.removed.push(name);
                }
                ChangeStatus::Added | ChangeStatus::Modified => {
                    match self.fetch_doc(&change.filename, &change.filename).await {
                        Ok(doc) => staged.push((name, change.status, doc)),
                        Err(err) => {
                            warn!(
                                resource = %self.resource,
                                schema = %name,
                                error = %err,
                                "skipping changed schema that failed to load"
                            );
                        }
                    }
                }
            }
        }

        // Trial-resolve each staged document against the post-tick set
        // before committing it. An edit that no longer resolves must not
        // wipe the prior good resolved form.
        let mut candidate = self.raw.clone();
        for (name, _, doc) in &staged {
            candidate.insert(name.clone(), doc.clone());
        }
        let mut scratch = SchemaGraph::new();
        for (name, status, doc) in staged {
            match scratch.resolve(&name, &doc, &candidate) {
                Ok(_) => {
                    self.raw.insert(name.clone(), doc);
                    let affected = self.invalidate_with_dependents(&name);
                    if status == ChangeStatus::Modified {
                        modified_closure.extend(affected);
                    }
                }
                Err(err) if self.graph.resolved(&name).is_some() => {
                    warn!(
                        resource = %self.resource,
                        schema = %name,
                        error = %err,
                        "changed schema no longer resolves, keeping the prior form"
                    );
                }
                Err(err) => {
                    // No prior form to protect; keep it raw so it resolves
                    // once its references arrive.
                    warn!(
                        resource = %self.resource,
                        schema = %name,
                        error = %err,
                        "schema left unresolved"
                    );
                    self.raw.insert(name, doc);
                }
            }
        }

        // Everything that resolved this tick is either a modification (it
        // or a schema it references changed) or a new arrival, including
        // schemas deferred from earlier ticks by a dangling reference.
        for name in self.resolve_pending() {
            if modified_closure.contains(&name) {
                summary.modified.push(name);
            } else {
                summary.added.push(name);
            }
        }
        summary.added.sort();
        summary.modified.sort();
        summary.removed.sort();
        self.marker = Some(head);

        if !summary.is_empty() {
            info!(
                resource = %self.resource,
                added = summary.added.len(),
                modified = summary.modified.len(),
                removed = summary.removed.len(),
                "schema set changed"
            );
        }
        Ok(summary)
    }

    /// Invalidate `name` and everything that references it, returning the
    /// affected set. The next `resolve_pending` rebuilds them from raw.
    fn invalidate_with_dependents(&mut self, name: &str) -> BTreeSet<String> {
        let mut affected = self.graph.dependents_closure(name);
        affected.insert(name.to_string());
        for node in &affected {
            self.graph.invalidate(node);
        }
        affected
    }
}

/// Poll the config store until `shutdown` flips, notifying `listener`
/// whenever a tick actually changed the schema set. A failed tick logs
/// and backs off one extra interval; the next tick retries from the same
/// marker.
pub async fn run_sync_loop(
    engine: Arc<RwLock<SchemaSyncEngine>>,
    poll: Duration,
    shutdown: Arc<AtomicBool>,
    listener: Arc<dyn SchemaChangeListener>,
) {
    let resource = engine.read().await.resource().to_string();
    info!(resource = %resource, interval = ?poll, "schema sync loop started");

    loop {
        tokio::time::sleep(poll).await;
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let outcome = engine.write().await.sync_tick().await;
        match outcome {
            Ok(summary) if summary.is_empty() => {
                debug!(resource = %resource, "schema sync tick, no changes");
            }
            Ok(summary) => {
                listener.schemas_changed(&resource, &summary).await;
            }
            Err(err) => {
                warn!(resource = %resource, error = %err, "schema sync tick failed");
                tokio::time::sleep(poll).await;
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
        }
    }
    info!(resource = %resource, "schema sync loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_is_empty() {
        assert!(TickSummary::default().is_empty());
        let summary = TickSummary {
            added: vec!["1.0.0".to_string()],
            ..TickSummary::default()
        };
        assert!(!summary.is_empty());
    }
}
