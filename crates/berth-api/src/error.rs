//! API-facing error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use berth_core::ServiceError;
use berth_provisioning::ProvisionError;
use berth_schema::FieldIssue;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body or query string is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A required query parameter is absent.
    #[error("missing required parameter '{0}'")]
    MissingParam(&'static str),

    /// The payload violates the version's generated model.
    #[error("payload validation failed")]
    Validation(Vec<FieldIssue>),

    /// No such resource, version or instance.
    #[error("{0} not found")]
    NotFound(String),

    /// The requested operation exists on this path under another method.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// A backend call failed; carries the upstream service name.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Anything else; detail is logged, not leaked.
    #[error("internal error")]
    Internal(String),
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::MissingField { field } => {
                ApiError::BadRequest(format!("payload is missing required field '{field}'"))
            }
            ProvisionError::Serialize { detail } => ApiError::BadRequest(detail),
            ProvisionError::Service(ServiceError::NotFound { what, .. }) => ApiError::NotFound(what),
            ProvisionError::Service(e) => ApiError::Service(e),
            ProvisionError::Hook { event, detail } => {
                ApiError::Internal(format!("hook '{event}': {detail}"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                json!({"error": "bad_request", "message": message}),
            ),
            ApiError::MissingParam(name) => (
                StatusCode::BAD_REQUEST,
                "missing_parameter",
                json!({
                    "error": "missing_parameter",
                    "message": format!("missing required parameter '{name}'"),
                }),
            ),
            ApiError::Validation(issues) => {
                let fields: Vec<_> = issues
                    .iter()
                    .map(|i| json!({"field": i.path, "message": i.message}))
                    .collect();
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "validation_failed",
                    json!({
                        "error": "validation_failed",
                        "message": "payload does not conform to the schema",
                        "fields": fields,
                    }),
                )
            }
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "not_found",
                json!({"error": "not_found", "message": format!("{what} not found")}),
            ),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                json!({"error": "method_not_allowed", "message": "method not allowed on this path"}),
            ),
            ApiError::Service(ServiceError::Timeout { ref what, .. }) => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                json!({
                    "error": "timeout",
                    "message": format!("timed out waiting for {what}"),
                }),
            ),
            ApiError::Service(err) => {
                let backend = err
                    .backend()
                    .map_or("upstream service", |b| b.as_str());
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    json!({
                        "error": "upstream_error",
                        "message": format!("{backend} request failed: {err}"),
                    }),
                )
            }
            ApiError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    json!({"error": "internal_error", "message": "internal error"}),
                )
            }
        };
        if status.is_server_error() {
            warn!(status = %status, error = %error, "request failed");
        }
        (status, Json(body)).into_response()
    }
}
