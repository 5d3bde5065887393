//! Schema handling for the berth control plane.
//!
//! Three pieces live here:
//! - [`resolver::SchemaGraph`] expands `$ref`/`allOf` constructs against a
//!   store of named schema documents and tracks a bidirectional reference
//!   graph,
//! - [`engine::SchemaSyncEngine`] owns the authoritative schema set for
//!   one resource and reconciles it against the config store,
//! - [`model::GeneratedModel`] compiles a resolved schema into the
//!   validator applied to provisioning payloads.

pub mod engine;
pub mod error;
pub mod model;
pub mod names;
pub mod resolver;

pub use engine::{run_sync_loop, SchemaChangeListener, SchemaSyncEngine, TickSummary};
pub use error::SchemaError;
pub use model::{FieldIssue, FieldModel, FieldType, GeneratedModel, ObjectModel};
pub use names::{is_semver, normalize_name};
pub use resolver::SchemaGraph;
