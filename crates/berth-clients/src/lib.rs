//! Capability interfaces for the three external backends, plus the typed
//! reqwest clients that implement them.
//!
//! The rest of the control plane only ever talks to [`GitStore`],
//! [`SecretStore`] and [`Reconciler`]; the concrete clients here translate
//! transport and status failures into the shared
//! [`ServiceError`](berth_core::ServiceError) taxonomy and run every call
//! through the retry executor.

use std::collections::HashMap;

use async_trait::async_trait;
use berth_core::ServiceError;
use serde::{Deserialize, Serialize};

pub mod github;
pub mod reconciler;
pub mod vault;

pub use github::GitHubStore;
pub use reconciler::ArgoReconciler;
pub use vault::VaultStore;

/// How a file changed between two revisions of the config store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
}

/// One changed file reported by [`GitStore::get_changed_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    /// Repository-relative filename, e.g. `schemas/schema-1.0.0.json`.
    pub filename: String,
    pub status: ChangeStatus,
}

/// Minimal file/diff/commit view of the version-controlled config store.
#[async_trait]
pub trait GitStore: Send + Sync {
    /// List directory entries as `(name, path)` pairs.
    async fn list_dir(&self, path: &str) -> Result<Vec<(String, String)>, ServiceError>;

    /// Fetch a file's decoded content.
    async fn get_file_content(&self, path: &str) -> Result<String, ServiceError>;

    /// Create a new file with a commit message.
    async fn create_file(
        &self,
        path: &str,
        commit_message: &str,
        content: &str,
    ) -> Result<(), ServiceError>;

    /// Replace an existing file's content with a commit message.
    async fn modify_file(
        &self,
        path: &str,
        commit_message: &str,
        content: &str,
    ) -> Result<(), ServiceError>;

    /// Delete a file with a commit message.
    async fn delete_file(&self, path: &str, commit_message: &str) -> Result<(), ServiceError>;

    /// Files changed under `path` between two revisions.
    async fn get_changed_files(
        &self,
        path: &str,
        since: &str,
        until: &str,
    ) -> Result<Vec<ChangedFile>, ServiceError>;

    /// Current head revision, used as the sync marker between polls.
    async fn head(&self) -> Result<String, ServiceError>;
}

/// Key/value secret storage scoped by path.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn read_secret(&self, path: &str) -> Result<HashMap<String, String>, ServiceError>;

    async fn write_secret(
        &self,
        path: &str,
        data: &HashMap<String, String>,
    ) -> Result<(), ServiceError>;

    async fn delete_secret(&self, path: &str) -> Result<(), ServiceError>;
}

/// The GitOps convergence system driving cluster state toward the
/// committed config.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Fetch an application document. `NotFound` when the application does
    /// not exist; a 403 status is surfaced distinctly because the
    /// reconciler answers it for not-yet-created applications too.
    async fn get_application(&self, name: &str) -> Result<serde_json::Value, ServiceError>;

    /// Trigger a sync of the named application.
    async fn sync_application(&self, name: &str) -> Result<(), ServiceError>;

    /// Replace the application's stored values document.
    async fn patch_application_values(
        &self,
        values: &serde_json::Value,
        name: &str,
        namespace: &str,
        project: &str,
    ) -> Result<(), ServiceError>;

    /// Fetch the application's stored values document.
    async fn get_application_values(&self, name: &str) -> Result<String, ServiceError>;
}
