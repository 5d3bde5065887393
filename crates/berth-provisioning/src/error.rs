//! Orchestration errors.

use berth_core::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The payload is missing a routing field it must carry.
    #[error("payload is missing required field '{field}'")]
    MissingField { field: String },

    /// The payload or a stored document could not be (de)serialized.
    #[error("could not serialize values document: {detail}")]
    Serialize { detail: String },

    /// An extension point failed; the request is aborted.
    #[error("hook '{event}' failed: {detail}")]
    Hook { event: String, detail: String },

    /// A backend call failed after retries, or a wait-poll timed out.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ProvisionError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        ProvisionError::MissingField {
            field: field.into(),
        }
    }
}
