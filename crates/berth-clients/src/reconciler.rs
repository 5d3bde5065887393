//! Argo-CD-style reconciler client.
//!
//! A 403 from the reconciler can mean either "no permission" or "this
//! application does not exist yet"; it is kept as a distinct status error
//! so wait-polls can treat it as "not there yet".

use berth_core::{Backend, RetryPolicy, ServiceError};
use reqwest::{Client, Response};
use serde_json::json;
use tracing::debug;

/// Reconciler client speaking the Argo CD applications API.
pub struct ArgoReconciler {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ArgoReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgoReconciler")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl ArgoReconciler {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            retry,
        }
    }

    fn app_url(&self, name: &str) -> String {
        format!("{}/api/v1/applications/{name}", self.base_url)
    }

    async fn check(response: Response, what: &str) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        match code {
            404 => Err(ServiceError::not_found(Backend::Reconciler, what)),
            403 => Err(ServiceError::status(
                Backend::Reconciler,
                403,
                format!("no access to application, or it does not exist: {body}"),
            )),
            307 => Err(ServiceError::status(
                Backend::Reconciler,
                307,
                format!("endpoint is redirecting: {body}"),
            )),
            _ => Err(ServiceError::status(Backend::Reconciler, code, body)),
        }
    }
}

#[async_trait::async_trait]
impl crate::Reconciler for ArgoReconciler {
    async fn get_application(&self, name: &str) -> Result<serde_json::Value, ServiceError> {
        let url = self.app_url(name);
        self.retry
            .execute("reconciler.get_application", || async {
                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.token)
                    .send()
                    .await
                    .map_err(|e| ServiceError::transport(Backend::Reconciler, e.to_string()))?;
                let response = Self::check(response, name).await?;
                response
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|e| ServiceError::transport(Backend::Reconciler, e.to_string()))
            })
            .await
    }

    async fn sync_application(&self, name: &str) -> Result<(), ServiceError> {
        let url = format!("{}/sync", self.app_url(name));
        debug!(application = name, "triggering reconciler sync");
        self.retry
            .execute("reconciler.sync_application", || async {
                let response = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.token)
                    .json(&json!({}))
                    .send()
                    .await
                    .map_err(|e| ServiceError::transport(Backend::Reconciler, e.to_string()))?;
                Self::check(response, name).await?;
                Ok(())
            })
            .await
    }

    async fn patch_application_values(
        &self,
        values: &serde_json::Value,
        name: &str,
        namespace: &str,
        project: &str,
    ) -> Result<(), ServiceError> {
        let url = self.app_url(name);
        let values_yaml = serde_yaml::to_string(values).map_err(|e| {
            ServiceError::transport(Backend::Reconciler, format!("values are not YAML-safe: {e}"))
        })?;
        let body = json!({
            "name": name,
            "namespace": namespace,
            "project": project,
            "spec": { "source": { "helm": { "values": values_yaml } } },
        });
        debug!(application = name, "patching application values");
        self.retry
            .execute("reconciler.patch_application_values", || {
                let body = body.clone();
                let url = url.clone();
                async move {
                    let response = self
                        .client
                        .patch(&url)
                        .bearer_auth(&self.token)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| ServiceError::transport(Backend::Reconciler, e.to_string()))?;
                    Self::check(response, name).await?;
                    Ok(())
                }
            })
            .await
    }

    async fn get_application_values(&self, name: &str) -> Result<String, ServiceError> {
        let app = self.get_application(name).await?;
        Ok(app
            .pointer("/spec/source/helm/values")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}
