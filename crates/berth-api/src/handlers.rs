//! Operation handlers invoked by the dispatcher.

use std::collections::{BTreeSet, HashMap};

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use berth_provisioning::ProvisionOutcome;
use berth_schema::normalize_name;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::ResourceState;
use crate::error::ApiError;

fn require<'a>(
    params: &'a HashMap<String, String>,
    key: &'static str,
) -> Result<&'a str, ApiError> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::MissingParam(key))
}

fn instance_params<'a>(
    params: &'a HashMap<String, String>,
) -> Result<(&'a str, &'a str, &'a str), ApiError> {
    Ok((
        require(params, "cluster")?,
        require(params, "namespace")?,
        require(params, "name")?,
    ))
}

fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

pub async fn status(
    state: &ResourceState,
    params: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    let (cluster, namespace, name) = instance_params(params)?;
    let status = state.orchestrator.status(cluster, namespace, name).await?;
    Ok(Json(status).into_response())
}

#[derive(Deserialize)]
struct CanRemoveRequest {
    schemas: Vec<String>,
}

/// Dry-run of a batch schema removal. Advisory only: the sync engine
/// re-validates when the upstream removal actually lands.
pub async fn can_remove(state: &ResourceState, body: &[u8]) -> Result<Response, ApiError> {
    let request: CanRemoveRequest =
        serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;
    let batch: BTreeSet<String> = request
        .schemas
        .iter()
        .map(|s| normalize_name(s))
        .collect();

    let engine = state.engine.read().await;
    let results: Vec<Value> = request
        .schemas
        .iter()
        .map(|schema| {
            let (can_remove, reason) = engine.can_remove(&normalize_name(schema), &batch);
            match reason {
                Some(reason) => {
                    json!({"schema": schema, "canRemove": can_remove, "reason": reason})
                }
                None => json!({"schema": schema, "canRemove": can_remove}),
            }
        })
        .collect();
    Ok(Json(results).into_response())
}

pub async fn read_config(
    state: &ResourceState,
    params: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    let (cluster, namespace, name) = instance_params(params)?;
    let content = state.orchestrator.read(cluster, namespace, name).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    )
        .into_response())
}

pub async fn delete_instance(
    state: &ResourceState,
    params: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    let (cluster, namespace, name) = instance_params(params)?;
    let outcome = state.orchestrator.delete(cluster, namespace, name).await?;
    Ok(accepted(outcome))
}

pub async fn create(
    state: &ResourceState,
    version: &str,
    body: &[u8],
) -> Result<Response, ApiError> {
    let payload = parse_body(body)?;
    validate(state, version, &payload).await?;
    let outcome = state.orchestrator.create(version, payload).await?;
    Ok(accepted(outcome))
}

pub async fn update(
    state: &ResourceState,
    version: &str,
    body: &[u8],
) -> Result<Response, ApiError> {
    let payload = parse_body(body)?;
    validate(state, version, &payload).await?;
    match state.orchestrator.update(version, payload).await? {
        ProvisionOutcome::NoOp { message, values } => Ok((
            StatusCode::OK,
            Json(json!({"message": message, "values": values})),
        )
            .into_response()),
        outcome => Ok(accepted(outcome)),
    }
}

pub async fn definition(state: &ResourceState, version: &str) -> Result<Response, ApiError> {
    let engine = state.engine.read().await;
    let Some(resolved) = engine.resolved(version) else {
        return Err(ApiError::NotFound(format!("schema version '{version}'")));
    };
    Ok(Json(resolved.clone()).into_response())
}

async fn validate(state: &ResourceState, version: &str, payload: &Value) -> Result<(), ApiError> {
    let Some(model) = state.manager.model_for(version).await else {
        return Err(ApiError::NotFound(format!("schema version '{version}'")));
    };
    model.validate(payload).map_err(ApiError::Validation)
}

fn accepted(outcome: ProvisionOutcome) -> Response {
    let message = match outcome {
        ProvisionOutcome::Accepted { message } | ProvisionOutcome::NoOp { message, .. } => message,
    };
    (StatusCode::ACCEPTED, Json(json!({"message": message}))).into_response()
}
