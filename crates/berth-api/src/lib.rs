//! HTTP surface of the berth control plane.
//!
//! The versioned provisioning routes are not static axum routes: they
//! live in a swappable [`table::RouteTable`] owned by a
//! [`manager::RouteLifecycleManager`] per resource, and a single
//! dispatcher handler resolves `(path, method)` against the current table
//! snapshot. Versions appearing or disappearing upstream therefore change
//! the served surface without touching the router.

pub mod describe;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod table;

pub use dispatch::{router, AppState, ResourceState};
pub use error::ApiError;
pub use manager::RouteLifecycleManager;
pub use table::{Operation, RouteEntry, RouteTable};
