//! The provisioning workflow: decompose, hooks, idempotence check,
//! namespace registration, config and secret writes, reconciler sync with
//! bounded wait-polls.
//!
//! Every workflow is fatal on first failure and performs no automatic
//! rollback; drift left behind by a partially completed request is
//! reconciled by an operator. This is a documented limitation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use berth_clients::{GitStore, Reconciler, SecretStore};
use berth_core::ServiceError;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::canonical::canonical_eq;
use crate::context::{HookEvent, OperationKind, ProvisioningContext};
use crate::error::ProvisionError;
use crate::hooks::HookRegistry;
use crate::registry::ClusterRegistry;

/// Fixed interval between reconciler wait-poll probes. The overall wait
/// is bounded by the configurable timeout, not by attempt count.
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How a provisioning request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The workflow ran; convergence continues asynchronously.
    Accepted { message: String },
    /// Update idempotence: the stored document already matches.
    NoOp { message: String, values: Value },
}

/// Reconciler-reported sync state of one instance.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceStatus {
    pub status: String,
    pub version: String,
}

/// Progress of the delete workflow, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeletePhase {
    Requested,
    ConfigDeleted,
    SyncTriggered,
    PollingForGone,
    ConfirmedGone,
}

impl std::fmt::Display for DeletePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeletePhase::Requested => "requested",
            DeletePhase::ConfigDeleted => "config-deleted",
            DeletePhase::SyncTriggered => "sync-triggered",
            DeletePhase::PollingForGone => "polling-for-gone",
            DeletePhase::ConfirmedGone => "confirmed-gone",
        };
        f.write_str(s)
    }
}

/// Create/read/update/delete orchestration for one resource.
pub struct ProvisioningOrchestrator {
    resource: String,
    git: Arc<dyn GitStore>,
    secret_store: Arc<dyn SecretStore>,
    reconciler: Arc<dyn Reconciler>,
    clusters: Arc<ClusterRegistry>,
    hooks: HookRegistry,
    wait_timeout: Duration,
}

impl ProvisioningOrchestrator {
    pub fn new(
        resource: impl Into<String>,
        git: Arc<dyn GitStore>,
        secret_store: Arc<dyn SecretStore>,
        reconciler: Arc<dyn Reconciler>,
        clusters: Arc<ClusterRegistry>,
        hooks: HookRegistry,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            resource: resource.into(),
            git,
            secret_store,
            reconciler,
            clusters,
            hooks,
            wait_timeout,
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Create one instance. The namespace allow-list is registered before
    /// the instance config is written, so the reconciler already knows
    /// the namespace when the new application syncs.
    pub async fn create(
        &self,
        version: &str,
        payload: Value,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let mut ctx = self.context_from_payload(OperationKind::Create, payload)?;
        ctx.version = Some(version.to_string());
        self.run_pre(&mut ctx).await?;
        self.finalize_identity(&mut ctx);
        info!(
            resource = %self.resource,
            cluster = %ctx.cluster,
            namespace = %ctx.namespace,
            name = %ctx.name,
            version = %version,
            "create requested"
        );

        self.clusters
            .ensure_namespace(&ctx.cluster, &ctx.namespace)
            .await?;

        let content = to_yaml(&ctx.values)?;
        let message = format!(
            "Create {} {}'s values file in {}/{}",
            ctx.name, self.resource, ctx.cluster, ctx.namespace
        );
        self.git
            .create_file(&ctx.config_path, &message, &content)
            .await?;

        self.write_secrets(&mut ctx).await?;

        self.wait_for_application(&ctx.app_name).await?;
        self.reconciler.sync_application(&ctx.app_name).await?;

        self.run_post(&ctx).await?;
        Ok(ProvisionOutcome::Accepted {
            message: format!(
                "Create request accepted for {} app={}, cluster={}, namespace={}",
                self.resource, ctx.name, ctx.cluster, ctx.namespace
            ),
        })
    }

    /// Update one instance. A semantically unchanged document
    /// short-circuits with a no-op before any write happens.
    pub async fn update(
        &self,
        version: &str,
        payload: Value,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let mut ctx = self.context_from_payload(OperationKind::Update, payload)?;
        ctx.version = Some(version.to_string());
        self.run_pre(&mut ctx).await?;
        self.finalize_identity(&mut ctx);

        let current_text = self.git.get_file_content(&ctx.config_path).await?;
        let current: Value =
            serde_yaml::from_str(&current_text).map_err(|e| ProvisionError::Serialize {
                detail: e.to_string(),
            })?;
        if canonical_eq(&current, &ctx.values) {
            info!(
                resource = %self.resource,
                cluster = %ctx.cluster,
                namespace = %ctx.namespace,
                name = %ctx.name,
                "update is a no-op, stored values already match"
            );
            return Ok(ProvisionOutcome::NoOp {
                message: format!(
                    "No changes for {} app={}, stored values already match",
                    self.resource, ctx.name
                ),
                values: current,
            });
        }

        let content = to_yaml(&ctx.values)?;
        let message = format!(
            "Modify {} {}'s values file in {}/{}",
            ctx.name, self.resource, ctx.cluster, ctx.namespace
        );
        self.git
            .modify_file(&ctx.config_path, &message, &content)
            .await?;

        self.write_secrets(&mut ctx).await?;

        self.wait_for_application(&ctx.app_name).await?;
        self.reconciler.sync_application(&ctx.app_name).await?;

        self.run_post(&ctx).await?;
        Ok(ProvisionOutcome::Accepted {
            message: format!(
                "Update request accepted for {} app={}, cluster={}, namespace={}",
                self.resource, ctx.name, ctx.cluster, ctx.namespace
            ),
        })
    }

    /// Current stored config document, as text.
    pub async fn read(
        &self,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Result<String, ProvisionError> {
        let mut ctx =
            ProvisioningContext::new(&self.resource, OperationKind::Read, cluster, namespace, name);
        self.run_pre(&mut ctx).await?;
        self.finalize_identity(&mut ctx);
        let content = self.git.get_file_content(&ctx.config_path).await?;
        self.run_post(&ctx).await?;
        Ok(content)
    }

    /// Delete one instance: config removal, reconciler sync, bounded wait
    /// until the application is gone, then secret cleanup. Secrets are
    /// never deleted before the reconciler confirms the application no
    /// longer exists.
    pub async fn delete(
        &self,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let mut ctx = ProvisioningContext::new(
            &self.resource,
            OperationKind::Delete,
            cluster,
            namespace,
            name,
        );
        self.run_pre(&mut ctx).await?;
        self.finalize_identity(&mut ctx);

        let mut phase = DeletePhase::Requested;
        info!(
            resource = %self.resource,
            cluster = %ctx.cluster,
            namespace = %ctx.namespace,
            name = %ctx.name,
            phase = %phase,
            "delete requested"
        );

        let message = format!(
            "Delete {} {}'s values file in {}/{}",
            ctx.name, self.resource, ctx.cluster, ctx.namespace
        );
        self.git.delete_file(&ctx.config_path, &message).await?;
        phase = DeletePhase::ConfigDeleted;
        debug!(app = %ctx.app_name, phase = %phase, "config file removed");

        match self.reconciler.sync_application(&ctx.app_name).await {
            Ok(()) => {
                phase = DeletePhase::SyncTriggered;
                debug!(app = %ctx.app_name, phase = %phase, "reconciler sync triggered");
            }
            Err(e) if e.is_not_found() || e.is_forbidden() => {
                debug!(app = %ctx.app_name, "application already gone before sync");
            }
            Err(e) => return Err(e.into()),
        }

        phase = DeletePhase::PollingForGone;
        debug!(app = %ctx.app_name, phase = %phase, "waiting for the application to disappear");
        self.wait_for_gone(&ctx.app_name).await?;
        phase = DeletePhase::ConfirmedGone;
        debug!(app = %ctx.app_name, phase = %phase, "application gone, cleaning up secrets");

        let secret_path = self.secret_path(&ctx);
        self.secret_store.delete_secret(&secret_path).await?;
        ctx.secret_path = Some(secret_path);

        self.run_post(&ctx).await?;
        Ok(ProvisionOutcome::Accepted {
            message: format!(
                "Delete request accepted for {} app={}, cluster={}, namespace={}",
                self.resource, ctx.name, ctx.cluster, ctx.namespace
            ),
        })
    }

    /// Reconciler-reported sync status and revision of one instance.
    pub async fn status(
        &self,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Result<InstanceStatus, ProvisionError> {
        let app = build_app_name(cluster, namespace, &self.resource, name);
        let doc = self.reconciler.get_application(&app).await?;
        Ok(InstanceStatus {
            status: doc
                .pointer("/status/sync/status")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            version: doc
                .pointer("/status/sync/revision")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    fn context_from_payload(
        &self,
        operation: OperationKind,
        payload: Value,
    ) -> Result<ProvisioningContext, ProvisionError> {
        let parts = decompose(payload)?;
        let mut ctx = ProvisioningContext::new(
            &self.resource,
            operation,
            parts.cluster,
            parts.namespace,
            parts.name,
        );
        ctx.values = parts.values;
        ctx.secrets = parts.secrets;
        Ok(ctx)
    }

    /// Compute the fields derived from identity. Runs after the pre-hook
    /// merge, so hook overrides of cluster/namespace/name propagate.
    fn finalize_identity(&self, ctx: &mut ProvisioningContext) {
        ctx.config_path = format!("{}/{}/{}.yaml", ctx.cluster, ctx.namespace, ctx.name);
        ctx.app_name = build_app_name(&ctx.cluster, &ctx.namespace, &self.resource, &ctx.name);
    }

    fn secret_path(&self, ctx: &ProvisioningContext) -> String {
        format!(
            "{}/{}/{}/{}",
            self.resource, ctx.cluster, ctx.namespace, ctx.name
        )
    }

    async fn run_pre(&self, ctx: &mut ProvisioningContext) -> Result<(), ProvisionError> {
        if let Some(patch) = self.hooks.run(HookEvent::pre(ctx.operation), ctx).await? {
            ctx.apply(patch);
        }
        Ok(())
    }

    async fn run_post(&self, ctx: &ProvisioningContext) -> Result<(), ProvisionError> {
        self.hooks.run(HookEvent::post(ctx.operation), ctx).await?;
        Ok(())
    }

    async fn write_secrets(&self, ctx: &mut ProvisioningContext) -> Result<(), ProvisionError> {
        if ctx.secrets.is_empty() {
            return Ok(());
        }
        let path = self.secret_path(ctx);
        self.secret_store.write_secret(&path, &ctx.secrets).await?;
        ctx.secret_path = Some(path);
        Ok(())
    }

    /// Poll until the reconciler can show the application. Not-found and
    /// forbidden both mean "not created yet"; the reconciler answers 403
    /// for applications that do not exist.
    async fn wait_for_application(&self, name: &str) -> Result<(), ServiceError> {
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            match self.reconciler.get_application(name).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_not_found() || e.is_forbidden() => {
                    if Instant::now() >= deadline {
                        return Err(ServiceError::Timeout {
                            what: format!("application '{name}' to be created"),
                            timeout: self.wait_timeout,
                        });
                    }
                    debug!(app = %name, "application not visible yet");
                    sleep(WAIT_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Poll until the reconciler no longer shows the application.
    async fn wait_for_gone(&self, name: &str) -> Result<(), ServiceError> {
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            match self.reconciler.get_application(name).await {
                Err(e) if e.is_not_found() || e.is_forbidden() => return Ok(()),
                Err(e) => return Err(e),
                Ok(_) => {
                    if Instant::now() >= deadline {
                        return Err(ServiceError::Timeout {
                            what: format!("application '{name}' to be removed"),
                            timeout: self.wait_timeout,
                        });
                    }
                    debug!(app = %name, "application still present");
                    sleep(WAIT_POLL_INTERVAL).await;
                }
            }
        }
    }
}

/// Deterministic reconciler application name for one instance.
#[must_use]
pub fn build_app_name(cluster: &str, namespace: &str, resource: &str, name: &str) -> String {
    format!("{cluster}-{namespace}-{resource}-{name}")
}

#[derive(Debug)]
struct PayloadParts {
    cluster: String,
    namespace: String,
    name: String,
    values: Value,
    secrets: HashMap<String, String>,
}

/// Split a request payload into routing identity, the value document and
/// the embedded secret map.
fn decompose(payload: Value) -> Result<PayloadParts, ProvisionError> {
    let Value::Object(mut map) = payload else {
        return Err(ProvisionError::Serialize {
            detail: "payload is not a JSON object".to_string(),
        });
    };
    let cluster = take_string(&mut map, "cluster")?;
    let namespace = take_string(&mut map, "namespace")?;
    let name = take_string(&mut map, "applicationName")?;
    let secrets = match map.remove("secrets") {
        None => HashMap::new(),
        Some(Value::Object(entries)) => entries
            .into_iter()
            .map(|(k, v)| (k, secret_value_to_string(v)))
            .collect(),
        Some(_) => {
            return Err(ProvisionError::Serialize {
                detail: "'secrets' must be a mapping".to_string(),
            })
        }
    };
    Ok(PayloadParts {
        cluster,
        namespace,
        name,
        values: Value::Object(map),
        secrets,
    })
}

fn take_string(
    map: &mut serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, ProvisionError> {
    match map.remove(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        _ => Err(ProvisionError::missing_field(field)),
    }
}

fn secret_value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn to_yaml(value: &Value) -> Result<String, ProvisionError> {
    serde_yaml::to_string(value).map_err(|e| ProvisionError::Serialize {
        detail: e.to_string(),
    })
}
