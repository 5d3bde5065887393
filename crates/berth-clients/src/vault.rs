//! Vault KV v2 client for the secret store.
//!
//! The first path segment is the mount; reads and writes go through
//! `{mount}/data/{rest}` while a full delete uses `{mount}/metadata/{rest}`
//! so every version of the secret is removed.

use std::collections::HashMap;

use berth_core::{Backend, RetryPolicy, ServiceError};
use reqwest::{Client, Response};
use serde_json::json;
use tracing::debug;

/// Secret-store client backed by Vault KV v2.
pub struct VaultStore {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// `redis/eu/team-a/svc1` -> `redis/data/eu/team-a/svc1`.
fn data_path(path: &str) -> String {
    split_mount(path, "data")
}

/// `redis/eu/team-a/svc1` -> `redis/metadata/eu/team-a/svc1`.
fn metadata_path(path: &str) -> String {
    split_mount(path, "metadata")
}

fn split_mount(path: &str, segment: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((mount, rest)) => format!("{mount}/{segment}/{rest}"),
        None => format!("{trimmed}/{segment}"),
    }
}

impl VaultStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            retry,
        }
    }

    fn url(&self, vault_path: &str) -> String {
        format!("{}/v1/{vault_path}", self.base_url)
    }

    async fn check(response: Response, what: &str) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 404 {
            return Err(ServiceError::not_found(Backend::SecretStore, what));
        }
        let errors = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("errors").map(std::string::ToString::to_string))
            .unwrap_or_default();
        Err(ServiceError::status(
            Backend::SecretStore,
            status.as_u16(),
            errors,
        ))
    }
}

#[async_trait::async_trait]
impl crate::SecretStore for VaultStore {
    async fn read_secret(&self, path: &str) -> Result<HashMap<String, String>, ServiceError> {
        let url = self.url(&data_path(path));
        self.retry
            .execute("secret_store.read", || async {
                let response = self
                    .client
                    .get(&url)
                    .header("X-Vault-Token", &self.token)
                    .send()
                    .await
                    .map_err(|e| ServiceError::transport(Backend::SecretStore, e.to_string()))?;
                let response = Self::check(response, path).await?;
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| ServiceError::transport(Backend::SecretStore, e.to_string()))?;
                // KV v2 nests the payload under data.data.
                let data = body
                    .get("data")
                    .and_then(|d| d.get("data"))
                    .cloned()
                    .unwrap_or_default();
                serde_json::from_value(data).map_err(|e| {
                    ServiceError::transport(
                        Backend::SecretStore,
                        format!("unexpected secret shape at {path}: {e}"),
                    )
                })
            })
            .await
    }

    async fn write_secret(
        &self,
        path: &str,
        data: &HashMap<String, String>,
    ) -> Result<(), ServiceError> {
        let url = self.url(&data_path(path));
        debug!(path, keys = data.len(), "writing secret");
        self.retry
            .execute("secret_store.write", || async {
                let response = self
                    .client
                    .post(&url)
                    .header("X-Vault-Token", &self.token)
                    .json(&json!({ "data": data }))
                    .send()
                    .await
                    .map_err(|e| ServiceError::transport(Backend::SecretStore, e.to_string()))?;
                Self::check(response, path).await?;
                Ok(())
            })
            .await
    }

    async fn delete_secret(&self, path: &str) -> Result<(), ServiceError> {
        let url = self.url(&metadata_path(path));
        debug!(path, "deleting secret");
        self.retry
            .execute("secret_store.delete", || async {
                let response = self
                    .client
                    .delete(&url)
                    .header("X-Vault-Token", &self.token)
                    .send()
                    .await
                    .map_err(|e| ServiceError::transport(Backend::SecretStore, e.to_string()))?;
                Self::check(response, path).await?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv2_paths_split_on_the_mount() {
        assert_eq!(data_path("redis/eu/team-a/svc1"), "redis/data/eu/team-a/svc1");
        assert_eq!(
            metadata_path("/redis/eu/team-a/svc1"),
            "redis/metadata/eu/team-a/svc1"
        );
        assert_eq!(data_path("redis"), "redis/data");
    }
}
