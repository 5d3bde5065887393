//! Schema resolution and sync errors.

use berth_core::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    /// The document is not a JSON object at the top level.
    #[error("schema '{name}' is not a JSON object")]
    Format { name: String },

    /// A `$ref` points at a name the store does not contain.
    #[error("schema '{name}' references unknown schema '{missing}'")]
    Reference { name: String, missing: String },

    /// A `$ref` chain loops back on itself.
    #[error("schema '{name}' is part of a reference cycle")]
    Circular { name: String },

    /// The stored document is not parseable JSON.
    #[error("schema '{name}' is not valid JSON: {detail}")]
    Parse { name: String, detail: String },

    /// A config-store call failed while loading or syncing.
    #[error(transparent)]
    Service(#[from] ServiceError),
}
