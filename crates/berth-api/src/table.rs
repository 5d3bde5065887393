//! The servable-operation table for one resource.

use axum::http::Method;

/// One servable operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Status,
    CanRemove,
    ReadConfig,
    DeleteInstance,
    Create { version: String },
    Update { version: String },
    Definition { version: String },
}

impl Operation {
    /// The schema version this operation is scoped to, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Operation::Create { version }
            | Operation::Update { version }
            | Operation::Definition { version } => Some(version),
            _ => None,
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Operation::Status => "Reconciler sync status of one instance".to_string(),
            Operation::CanRemove => "Dry-run a batch schema removal".to_string(),
            Operation::ReadConfig => "Current stored config of one instance".to_string(),
            Operation::DeleteInstance => "Delete one instance".to_string(),
            Operation::Create { version } => format!("Create an instance (schema {version})"),
            Operation::Update { version } => format!("Update an instance (schema {version})"),
            Operation::Definition { version } => {
                format!("Resolved schema definition for version {version}")
            }
        }
    }
}

/// One `(path, method)` mapped to an operation. Paths are relative to the
/// resource mount, e.g. `/1.0.0/definition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub path: String,
    pub method: Method,
    pub operation: Operation,
}

/// Immutable-once-published route table; the manager clones, mutates and
/// swaps it wholesale so a request handler never observes a route
/// mid-removal.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add unless an entry with the same `(path, method)` already exists.
    /// Returns whether the table changed.
    pub fn insert_if_absent(&mut self, entry: RouteEntry) -> bool {
        let duplicate = self
            .entries
            .iter()
            .any(|e| e.path == entry.path && e.method == entry.method);
        if duplicate {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove the two paths scoped to `version` (provision path and
    /// definition path). Returns the number of entries dropped.
    pub fn remove_version(&mut self, version: &str) -> usize {
        let provision = format!("/{version}");
        let definition = format!("/{version}/definition");
        let before = self.entries.len();
        self.entries
            .retain(|e| e.path != provision && e.path != definition);
        before - self.entries.len()
    }

    #[must_use]
    pub fn lookup(&self, path: &str, method: &Method) -> Option<&RouteEntry> {
        self.entries
            .iter()
            .find(|e| e.path == path && e.method == *method)
    }

    /// Whether any method is served on `path`, for 405 vs 404.
    #[must_use]
    pub fn serves_path(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    /// Versions currently carrying a create route.
    #[must_use]
    pub fn versions(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| match &e.operation {
                Operation::Create { version } => Some(version.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }
}

/// The four routes every resource serves regardless of version count.
#[must_use]
pub fn general_entries() -> Vec<RouteEntry> {
    vec![
        RouteEntry {
            path: "/status".to_string(),
            method: Method::GET,
            operation: Operation::Status,
        },
        RouteEntry {
            path: "/schemas/can-remove".to_string(),
            method: Method::POST,
            operation: Operation::CanRemove,
        },
        RouteEntry {
            path: "/".to_string(),
            method: Method::GET,
            operation: Operation::ReadConfig,
        },
        RouteEntry {
            path: "/".to_string(),
            method: Method::DELETE,
            operation: Operation::DeleteInstance,
        },
    ]
}

/// The three routes scoped to one schema version.
#[must_use]
pub fn version_entries(version: &str) -> Vec<RouteEntry> {
    vec![
        RouteEntry {
            path: format!("/{version}"),
            method: Method::POST,
            operation: Operation::Create {
                version: version.to_string(),
            },
        },
        RouteEntry {
            path: format!("/{version}"),
            method: Method::PATCH,
            operation: Operation::Update {
                version: version.to_string(),
            },
        },
        RouteEntry {
            path: format!("/{version}/definition"),
            method: Method::GET,
            operation: Operation::Definition {
                version: version.to_string(),
            },
        },
    ]
}
