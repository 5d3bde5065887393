//! HTTP-level tests for the typed backend clients, stubbed with wiremock.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use berth_clients::{ArgoReconciler, GitHubStore, GitStore, Reconciler, SecretStore, VaultStore};
use berth_core::RetryPolicy;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn no_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(0),
        max_delay: Duration::from_millis(0),
    }
}

fn b64(content: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(content.as_bytes())
}

#[tokio::test]
async fn github_get_file_content_decodes_base64() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contents/eu/team-a/svc1.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "abc123",
            "content": b64("replicas: 3\n"),
        })))
        .mount(&server)
        .await;

    let store = GitHubStore::new(server.uri(), "token", no_retry());
    let content = store.get_file_content("/eu/team-a/svc1.yaml").await.unwrap();
    assert_eq!(content, "replicas: 3\n");
}

#[tokio::test]
async fn github_modify_file_sends_current_sha() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contents/eu/team-a/svc1.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "oldsha",
            "content": b64("replicas: 1\n"),
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/contents/eu/team-a/svc1.yaml"))
        .and(body_partial_json(json!({ "sha": "oldsha" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"commit": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let store = GitHubStore::new(server.uri(), "token", no_retry());
    store
        .modify_file("/eu/team-a/svc1.yaml", "Modify svc1", "replicas: 3\n")
        .await
        .unwrap();
}

#[tokio::test]
async fn github_missing_file_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contents/eu/team-a/nope.yaml"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let store = GitHubStore::new(server.uri(), "token", no_retry());
    let err = store.get_file_content("/eu/team-a/nope.yaml").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn github_changed_files_filters_by_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/compare/aaa...bbb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                {"filename": "schemas/schema-1.0.0.json", "status": "modified"},
                {"filename": "schemas/base-schema.json", "status": "removed"},
                {"filename": "eu/team-a/svc1.yaml", "status": "added"},
            ]
        })))
        .mount(&server)
        .await;

    let store = GitHubStore::new(server.uri(), "token", no_retry());
    let changed = store.get_changed_files("/schemas", "aaa", "bbb").await.unwrap();
    assert_eq!(changed.len(), 2);
    assert!(changed.iter().all(|c| c.filename.starts_with("schemas/")));
}

#[tokio::test]
async fn vault_read_unwraps_kv2_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/redis/data/eu/team-a/svc1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "data": { "password": "hunter2" }, "metadata": { "version": 2 } }
        })))
        .mount(&server)
        .await;

    let store = VaultStore::new(server.uri(), "token", no_retry());
    let secret = store.read_secret("redis/eu/team-a/svc1").await.unwrap();
    assert_eq!(secret.get("password").map(String::as_str), Some("hunter2"));
}

#[tokio::test]
async fn vault_delete_uses_metadata_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/redis/metadata/eu/team-a/svc1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = VaultStore::new(server.uri(), "token", no_retry());
    store.delete_secret("redis/eu/team-a/svc1").await.unwrap();
}

#[tokio::test]
async fn vault_write_wraps_payload_in_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/redis/data/eu/team-a/svc1"))
        .and(body_partial_json(json!({ "data": { "password": "hunter2" } })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = VaultStore::new(server.uri(), "token", no_retry());
    let mut data = HashMap::new();
    data.insert("password".to_string(), "hunter2".to_string());
    store.write_secret("redis/eu/team-a/svc1", &data).await.unwrap();
}

#[tokio::test]
async fn reconciler_forbidden_is_distinguishable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/applications/eu-team-a-redis-svc1"))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&server)
        .await;

    let argo = ArgoReconciler::new(server.uri(), "token", no_retry());
    let err = argo.get_application("eu-team-a-redis-svc1").await.unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn reconciler_missing_application_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/applications/eu-team-a-redis-gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let argo = ArgoReconciler::new(server.uri(), "token", no_retry());
    let err = argo.get_application("eu-team-a-redis-gone").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn reconciler_sync_posts_to_sync_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/applications/eu-team-a-redis-svc1/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let argo = ArgoReconciler::new(server.uri(), "token", no_retry());
    argo.sync_application("eu-team-a-redis-svc1").await.unwrap();
}

#[tokio::test]
async fn transient_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/applications/eu-team-a-redis-svc1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/applications/eu-team-a-redis-svc1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"metadata": {}})))
        .mount(&server)
        .await;

    let retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(0),
        max_delay: Duration::from_millis(0),
    };
    let argo = ArgoReconciler::new(server.uri(), "token", retry);
    let app = argo.get_application("eu-team-a-redis-svc1").await.unwrap();
    assert!(app.get("metadata").is_some());
}
