//! Provisioning orchestration for the berth control plane.
//!
//! The [`orchestrator::ProvisioningOrchestrator`] executes the
//! create/read/update/delete workflow for one resource across the config
//! store, secret store and reconciler, with pre/post extension points and
//! bounded wait-polls on reconciler state transitions.

pub mod canonical;
pub mod context;
pub mod error;
pub mod hooks;
pub mod orchestrator;
pub mod registry;

pub use canonical::canonical_eq;
pub use context::{ContextPatch, HookEvent, OperationKind, ProvisioningContext};
pub use error::ProvisionError;
pub use hooks::{HookRegistry, ProvisionHook};
pub use orchestrator::{InstanceStatus, ProvisionOutcome, ProvisioningOrchestrator};
pub use registry::ClusterRegistry;
