//! Shared foundations for the berth provisioning control plane.
//!
//! This crate carries the pieces every other crate needs:
//! - the external-service error taxonomy ([`ServiceError`]),
//! - the bounded retry executor ([`retry::RetryPolicy`]) used for every
//!   outbound call.

pub mod error;
pub mod retry;

pub use error::{Backend, ServiceError};
pub use retry::{Retryable, RetryPolicy};
