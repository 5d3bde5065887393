//! Error taxonomy for calls to the three external backends.

use std::time::Duration;

use thiserror::Error;

use crate::retry::Retryable;

/// Which external backend a [`ServiceError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// The version-controlled configuration store.
    ConfigStore,
    /// The secret store.
    SecretStore,
    /// The GitOps deployment reconciler.
    Reconciler,
}

impl Backend {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::ConfigStore => "config store",
            Backend::SecretStore => "secret store",
            Backend::Reconciler => "reconciler",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the typed service clients.
///
/// Transport failures and 5xx statuses are retryable; everything else is
/// returned to the caller as-is.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The backend answered with a non-success status.
    #[error("{backend} request failed (status {status}): {detail}")]
    Status {
        backend: Backend,
        status: u16,
        detail: String,
    },

    /// The request never produced a response (DNS, connect, TLS, body).
    #[error("{backend} request failed: {detail}")]
    Transport { backend: Backend, detail: String },

    /// The named object does not exist on the backend.
    #[error("{backend}: '{what}' not found")]
    NotFound { backend: Backend, what: String },

    /// A bounded wait-poll elapsed without the expected state transition.
    #[error("timed out after {}s waiting for {what}", timeout.as_secs())]
    Timeout { what: String, timeout: Duration },
}

impl ServiceError {
    /// Status-carrying error for the given backend.
    pub fn status(backend: Backend, status: u16, detail: impl Into<String>) -> Self {
        ServiceError::Status {
            backend,
            status,
            detail: detail.into(),
        }
    }

    /// Transport-level error for the given backend.
    pub fn transport(backend: Backend, detail: impl Into<String>) -> Self {
        ServiceError::Transport {
            backend,
            detail: detail.into(),
        }
    }

    /// Missing-object error for the given backend.
    pub fn not_found(backend: Backend, what: impl Into<String>) -> Self {
        ServiceError::NotFound {
            backend,
            what: what.into(),
        }
    }

    /// The backend this error came from, if any.
    #[must_use]
    pub fn backend(&self) -> Option<Backend> {
        match self {
            ServiceError::Status { backend, .. }
            | ServiceError::Transport { backend, .. }
            | ServiceError::NotFound { backend, .. } => Some(*backend),
            ServiceError::Timeout { .. } => None,
        }
    }

    /// HTTP status attached to this error, if any.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ServiceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the backend refused access (HTTP 403).
    ///
    /// The reconciler answers 403 both for applications the token cannot
    /// see and for applications that do not exist yet, so wait-polls treat
    /// this as "not there yet" rather than as a failure.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.http_status() == Some(403)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }
}

impl Retryable for ServiceError {
    fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Transport { .. } => true,
            ServiceError::Status { status, .. } => *status >= 500,
            ServiceError::NotFound { .. } | ServiceError::Timeout { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        let err = ServiceError::transport(Backend::ConfigStore, "connection refused");
        assert!(err.is_retryable());
    }

    #[test]
    fn server_statuses_are_retryable_client_statuses_are_not() {
        assert!(ServiceError::status(Backend::Reconciler, 503, "unavailable").is_retryable());
        assert!(!ServiceError::status(Backend::Reconciler, 403, "forbidden").is_retryable());
        assert!(!ServiceError::status(Backend::ConfigStore, 404, "missing").is_retryable());
    }

    #[test]
    fn not_found_is_terminal() {
        let err = ServiceError::not_found(Backend::SecretStore, "redis/eu/team-a/svc1");
        assert!(!err.is_retryable());
        assert!(err.is_not_found());
    }

    #[test]
    fn forbidden_detection() {
        assert!(ServiceError::status(Backend::Reconciler, 403, "no access").is_forbidden());
        assert!(!ServiceError::status(Backend::Reconciler, 404, "gone").is_forbidden());
        assert!(!ServiceError::transport(Backend::Reconciler, "reset").is_forbidden());
    }

    #[test]
    fn display_names_the_backend() {
        let err = ServiceError::status(Backend::ConfigStore, 401, "token revoked");
        assert_eq!(
            err.to_string(),
            "config store request failed (status 401): token revoked"
        );
    }
}
