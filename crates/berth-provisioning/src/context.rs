//! Per-request provisioning context and the hook patch merge rule.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// Which workflow a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Read => "read",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extension points, one pre and one post per operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    PreCreate,
    PostCreate,
    PreRead,
    PostRead,
    PreUpdate,
    PostUpdate,
    PreDelete,
    PostDelete,
}

impl HookEvent {
    #[must_use]
    pub fn pre(op: OperationKind) -> Self {
        match op {
            OperationKind::Create => HookEvent::PreCreate,
            OperationKind::Read => HookEvent::PreRead,
            OperationKind::Update => HookEvent::PreUpdate,
            OperationKind::Delete => HookEvent::PreDelete,
        }
    }

    #[must_use]
    pub fn post(op: OperationKind) -> Self {
        match op {
            OperationKind::Create => HookEvent::PostCreate,
            OperationKind::Read => HookEvent::PostRead,
            OperationKind::Update => HookEvent::PostUpdate,
            OperationKind::Delete => HookEvent::PostDelete,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::PreCreate => "pre_create",
            HookEvent::PostCreate => "post_create",
            HookEvent::PreRead => "pre_read",
            HookEvent::PostRead => "post_read",
            HookEvent::PreUpdate => "pre_update",
            HookEvent::PostUpdate => "post_update",
            HookEvent::PreDelete => "pre_delete",
            HookEvent::PostDelete => "post_delete",
        }
    }

    /// Parse a configured event name, e.g. `pre_create`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pre_create" => Some(HookEvent::PreCreate),
            "post_create" => Some(HookEvent::PostCreate),
            "pre_read" => Some(HookEvent::PreRead),
            "post_read" => Some(HookEvent::PostRead),
            "pre_update" => Some(HookEvent::PreUpdate),
            "post_update" => Some(HookEvent::PostUpdate),
            "pre_delete" => Some(HookEvent::PreDelete),
            "post_delete" => Some(HookEvent::PostDelete),
            _ => None,
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable per-request record threaded through the workflow and handed to
/// extension points.
///
/// Pre-hook patches are merged before the config path and application
/// name are computed, so an identity override here deterministically
/// recomputes every dependent field.
#[derive(Debug, Clone)]
pub struct ProvisioningContext {
    pub resource: String,
    pub operation: OperationKind,
    pub cluster: String,
    pub namespace: String,
    pub name: String,
    /// Schema version for create/update; absent for read/delete/status.
    pub version: Option<String>,
    /// Config-store path, filled in once identity is final.
    pub config_path: String,
    /// Reconciler application name, filled in once identity is final.
    pub app_name: String,
    /// The value document written to the config store.
    pub values: Value,
    /// Secret map extracted from the payload.
    pub secrets: HashMap<String, String>,
    /// Secret-store path, filled in when secrets are written or deleted.
    pub secret_path: Option<String>,
}

impl ProvisioningContext {
    pub fn new(
        resource: impl Into<String>,
        operation: OperationKind,
        cluster: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            operation,
            cluster: cluster.into(),
            namespace: namespace.into(),
            name: name.into(),
            version: None,
            config_path: String::new(),
            app_name: String::new(),
            values: Value::Null,
            secrets: HashMap::new(),
            secret_path: None,
        }
    }

    /// Apply a hook patch: only the fields the hook returned override.
    pub fn apply(&mut self, patch: ContextPatch) {
        if let Some(cluster) = patch.cluster {
            self.cluster = cluster;
        }
        if let Some(namespace) = patch.namespace {
            self.namespace = namespace;
        }
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(values) = patch.values {
            self.values = values;
        }
        if let Some(secrets) = patch.secrets {
            self.secrets = secrets;
        }
    }
}

/// Partial override returned by an extension point.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextPatch {
    pub cluster: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub values: Option<Value>,
    pub secrets: Option<HashMap<String, String>>,
}
