//! The dispatcher: one axum handler resolving requests against the
//! current route-table snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use berth_provisioning::ProvisioningOrchestrator;
use berth_schema::SchemaSyncEngine;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::describe;
use crate::error::ApiError;
use crate::handlers;
use crate::manager::RouteLifecycleManager;
use crate::table::Operation;

/// Everything one resource needs to serve requests.
pub struct ResourceState {
    pub manager: Arc<RouteLifecycleManager>,
    pub orchestrator: Arc<ProvisioningOrchestrator>,
    pub engine: Arc<RwLock<SchemaSyncEngine>>,
}

pub struct AppState {
    pub resources: HashMap<String, Arc<ResourceState>>,
}

/// Static outer router: health, the merged API description, and the
/// per-resource dispatcher mount.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/openapi.json", get(openapi))
        .route("/v1/:resource", any(dispatch_root))
        .route("/v1/:resource/", any(dispatch_root))
        .route("/v1/:resource/*rest", any(dispatch_rest))
        .with_state(state)
}

async fn health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

async fn openapi(State(state): State<Arc<AppState>>) -> Response {
    let mut descriptions: Vec<Arc<Value>> = Vec::with_capacity(state.resources.len());
    for resource in state.resources.values() {
        descriptions.push(resource.manager.description().await);
    }
    let merged = describe::merge_descriptions(descriptions.iter().map(Arc::as_ref));
    Json(merged).into_response()
}

async fn dispatch_root(
    State(state): State<Arc<AppState>>,
    Path(resource): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    method: Method,
    body: Bytes,
) -> Result<Response, ApiError> {
    dispatch(&state, &resource, "/", method, params, body).await
}

async fn dispatch_rest(
    State(state): State<Arc<AppState>>,
    Path((resource, rest)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    method: Method,
    body: Bytes,
) -> Result<Response, ApiError> {
    let sub_path = format!("/{}", rest.trim_end_matches('/'));
    dispatch(&state, &resource, &sub_path, method, params, body).await
}

async fn dispatch(
    state: &AppState,
    resource: &str,
    sub_path: &str,
    method: Method,
    params: HashMap<String, String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let resource_state = state
        .resources
        .get(resource)
        .ok_or_else(|| ApiError::NotFound(format!("resource '{resource}'")))?;

    let table = resource_state.manager.table().await;
    let Some(entry) = table.lookup(sub_path, &method) else {
        if table.serves_path(sub_path) {
            return Err(ApiError::MethodNotAllowed);
        }
        return Err(ApiError::NotFound(format!(
            "operation '{method} {sub_path}' on resource '{resource}'"
        )));
    };
    debug!(
        resource = %resource,
        path = %sub_path,
        method = %method,
        "dispatching"
    );

    match &entry.operation {
        Operation::Status => handlers::status(resource_state, &params).await,
        Operation::CanRemove => handlers::can_remove(resource_state, &body).await,
        Operation::ReadConfig => handlers::read_config(resource_state, &params).await,
        Operation::DeleteInstance => handlers::delete_instance(resource_state, &params).await,
        Operation::Create { version } => handlers::create(resource_state, version, &body).await,
        Operation::Update { version } => handlers::update(resource_state, version, &body).await,
        Operation::Definition { version } => handlers::definition(resource_state, version).await,
    }
}
