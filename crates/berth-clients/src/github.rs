//! GitHub contents-API client for the config store.
//!
//! Files live base64-encoded behind `/contents/{path}`; modifications and
//! deletions need the current blob SHA, so those calls fetch it first.
//! Changed-file listings come from the compare endpoint.

use base64::Engine;
use berth_core::{Backend, RetryPolicy, ServiceError};
use reqwest::{Client, Response, StatusCode};
use serde_json::json;
use tracing::debug;

use crate::{ChangeStatus, ChangedFile};

/// Config-store client backed by a GitHub-style contents API.
///
/// `base_url` points at one repository, e.g.
/// `https://api.github.com/repos/acme/redis-config`.
pub struct GitHubStore {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GitHubStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubStore")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

fn b64_decode(content: &str) -> Result<String, ServiceError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| {
            ServiceError::transport(Backend::ConfigStore, format!("invalid base64 content: {e}"))
        })?;
    String::from_utf8(bytes).map_err(|e| {
        ServiceError::transport(Backend::ConfigStore, format!("content is not UTF-8: {e}"))
    })
}

fn b64_encode(content: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(content.as_bytes())
}

impl GitHubStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            retry,
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{}/contents/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Translate a non-success response into a typed error.
    async fn check(response: Response, what: &str) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => Err(ServiceError::status(
                Backend::ConfigStore,
                401,
                format!("token is invalid or revoked: {body}"),
            )),
            StatusCode::NOT_FOUND => Err(ServiceError::not_found(Backend::ConfigStore, what)),
            other => Err(ServiceError::status(
                Backend::ConfigStore,
                other.as_u16(),
                body,
            )),
        }
    }

    async fn get_json(&self, url: &str, what: &str) -> Result<serde_json::Value, ServiceError> {
        self.retry
            .execute("config_store.get", || async {
                let response = self
                    .client
                    .get(url)
                    .bearer_auth(&self.token)
                    .send()
                    .await
                    .map_err(|e| ServiceError::transport(Backend::ConfigStore, e.to_string()))?;
                let response = Self::check(response, what).await?;
                response
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|e| ServiceError::transport(Backend::ConfigStore, e.to_string()))
            })
            .await
    }

    async fn get_file_sha(&self, path: &str) -> Result<String, ServiceError> {
        let body = self.get_json(&self.contents_url(path), path).await?;
        body.get("sha")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::transport(Backend::ConfigStore, format!("no sha in response for {path}"))
            })
    }

    async fn put_contents(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<(), ServiceError> {
        self.retry
            .execute("config_store.put", || {
                let payload = payload.clone();
                async move {
                    let response = self
                        .client
                        .put(self.contents_url(path))
                        .bearer_auth(&self.token)
                        .json(&payload)
                        .send()
                        .await
                        .map_err(|e| ServiceError::transport(Backend::ConfigStore, e.to_string()))?;
                    Self::check(response, path).await?;
                    Ok(())
                }
            })
            .await
    }
}

#[async_trait::async_trait]
impl crate::GitStore for GitHubStore {
    async fn list_dir(&self, path: &str) -> Result<Vec<(String, String)>, ServiceError> {
        let body = self.get_json(&self.contents_url(path), path).await?;
        let entries = body.as_array().ok_or_else(|| {
            ServiceError::transport(Backend::ConfigStore, format!("{path} is not a directory"))
        })?;
        let mut files = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = entry.get("name").and_then(|v| v.as_str());
            let entry_path = entry.get("path").and_then(|v| v.as_str());
            if let (Some(name), Some(entry_path)) = (name, entry_path) {
                files.push((name.to_string(), format!("/{entry_path}")));
            }
        }
        Ok(files)
    }

    async fn get_file_content(&self, path: &str) -> Result<String, ServiceError> {
        let body = self.get_json(&self.contents_url(path), path).await?;
        let content = body.get("content").and_then(|v| v.as_str()).ok_or_else(|| {
            ServiceError::transport(Backend::ConfigStore, format!("no content field for {path}"))
        })?;
        b64_decode(content)
    }

    async fn create_file(
        &self,
        path: &str,
        commit_message: &str,
        content: &str,
    ) -> Result<(), ServiceError> {
        debug!(path, "creating config file");
        self.put_contents(
            path,
            json!({
                "message": commit_message,
                "content": b64_encode(content),
            }),
        )
        .await
    }

    async fn modify_file(
        &self,
        path: &str,
        commit_message: &str,
        content: &str,
    ) -> Result<(), ServiceError> {
        let sha = self.get_file_sha(path).await?;
        debug!(path, %sha, "modifying config file");
        self.put_contents(
            path,
            json!({
                "message": commit_message,
                "content": b64_encode(content),
                "sha": sha,
            }),
        )
        .await
    }

    async fn delete_file(&self, path: &str, commit_message: &str) -> Result<(), ServiceError> {
        let sha = self.get_file_sha(path).await?;
        debug!(path, %sha, "deleting config file");
        self.retry
            .execute("config_store.delete", || async {
                let response = self
                    .client
                    .delete(self.contents_url(path))
                    .bearer_auth(&self.token)
                    .json(&json!({ "message": commit_message, "sha": sha }))
                    .send()
                    .await
                    .map_err(|e| ServiceError::transport(Backend::ConfigStore, e.to_string()))?;
                Self::check(response, path).await?;
                Ok(())
            })
            .await
    }

    async fn get_changed_files(
        &self,
        path: &str,
        since: &str,
        until: &str,
    ) -> Result<Vec<ChangedFile>, ServiceError> {
        let url = format!("{}/compare/{since}...{until}", self.base_url);
        let body = self.get_json(&url, "comparison").await?;
        let prefix = path.trim_start_matches('/');
        let mut changed = Vec::new();
        for file in body
            .get("files")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
        {
            let filename = file.get("filename").and_then(|v| v.as_str());
            let status = file.get("status").and_then(|v| v.as_str());
            let (Some(filename), Some(status)) = (filename, status) else {
                continue;
            };
            if !filename.trim_start_matches('/').starts_with(prefix) {
                continue;
            }
            let status = match status {
                "added" => ChangeStatus::Added,
                "removed" => ChangeStatus::Removed,
                // Renames and content edits both mean "reload this file".
                _ => ChangeStatus::Modified,
            };
            changed.push(ChangedFile {
                filename: filename.to_string(),
                status,
            });
        }
        Ok(changed)
    }

    async fn head(&self) -> Result<String, ServiceError> {
        let url = format!("{}/commits/HEAD", self.base_url);
        let body = self.get_json(&url, "head commit").await?;
        body.get("sha")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::transport(Backend::ConfigStore, "no sha in head commit response")
            })
    }
}
