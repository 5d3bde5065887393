//! Server configuration, loaded from environment variables.
//!
//! Shared settings use the `BERTH_` prefix; per-resource settings use
//! `BERTH_<RESOURCE>_` with the resource name uppercased, e.g.
//! `BERTH_REDIS_REPO_URL` for the resource `redis` named in
//! `BERTH_RESOURCES`.

use std::env::VarError;
use std::net::SocketAddr;

/// Token wrapper that never appears in `Debug` output.
#[derive(Clone)]
pub struct SecretString(pub String);

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

impl SecretString {
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Schema sync poll interval, seconds.
    pub poll_interval_secs: u64,
    /// Bound on the reconciler wait-for-created / wait-for-gone polls.
    pub wait_timeout_secs: u64,
    pub reconciler_url: String,
    pub reconciler_token: SecretString,
    /// Reconciler project the applications belong to.
    pub project: String,
    /// Namespace the reconciler's own application objects live in.
    pub control_namespace: String,
    pub vault_url: String,
    pub vault_token: SecretString,
    pub resources: Vec<ResourceConfig>,
}

#[derive(Debug, Clone)]
pub struct ResourceConfig {
    pub name: String,
    /// Config repository holding instance values files.
    pub repo_url: String,
    pub repo_token: SecretString,
    /// Repository holding the schema directory. Defaults to the config
    /// repository.
    pub schema_repo_url: String,
    pub schema_repo_token: SecretString,
    pub schemas_path: String,
    /// Configured extension points as `event=hook-name` pairs.
    pub hooks: Vec<(String, String)>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load from a custom variable reader, so tests can supply variables
    /// without mutating process-global environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let listen_addr = reader("BERTH_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BERTH_LISTEN_ADDR".into(), e.to_string()))?;

        let poll_interval_secs = parse_u64(&reader, "BERTH_POLL_INTERVAL_SECS", 10)?;
        let wait_timeout_secs = parse_u64(&reader, "BERTH_WAIT_TIMEOUT_SECS", 300)?;

        let reconciler_url = require(&reader, "BERTH_RECONCILER_URL")?;
        let reconciler_token = SecretString(require(&reader, "BERTH_RECONCILER_TOKEN")?);
        let project = reader("BERTH_PROJECT").unwrap_or_else(|_| "default".to_string());
        let control_namespace =
            reader("BERTH_CONTROL_NAMESPACE").unwrap_or_else(|_| "argocd".to_string());

        let vault_url = require(&reader, "BERTH_VAULT_URL")?;
        let vault_token = SecretString(require(&reader, "BERTH_VAULT_TOKEN")?);

        let names = require(&reader, "BERTH_RESOURCES")?;
        let mut resources = Vec::new();
        for name in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            resources.push(ResourceConfig::from_reader(&reader, name)?);
        }
        if resources.is_empty() {
            return Err(ConfigError::InvalidValue(
                "BERTH_RESOURCES".into(),
                "no resources configured".into(),
            ));
        }

        Ok(Self {
            listen_addr,
            poll_interval_secs,
            wait_timeout_secs,
            reconciler_url,
            reconciler_token,
            project,
            control_namespace,
            vault_url,
            vault_token,
            resources,
        })
    }
}

impl ResourceConfig {
    fn from_reader<F>(reader: &F, name: &str) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let prefix = format!("BERTH_{}_", name.to_uppercase().replace('-', "_"));
        let var = |suffix: &str| format!("{prefix}{suffix}");

        let repo_url = require(reader, &var("REPO_URL"))?;
        let repo_token = SecretString(require(reader, &var("REPO_TOKEN"))?);
        let schema_repo_url = reader(&var("SCHEMA_REPO_URL")).unwrap_or_else(|_| repo_url.clone());
        let schema_repo_token = reader(&var("SCHEMA_REPO_TOKEN"))
            .map(SecretString)
            .unwrap_or_else(|_| repo_token.clone());
        let schemas_path = reader(&var("SCHEMAS_PATH")).unwrap_or_else(|_| "schemas".to_string());

        let hooks = reader(&var("HOOKS"))
            .ok()
            .map(|raw| parse_hooks(&raw))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            name: name.to_string(),
            repo_url,
            repo_token,
            schema_repo_url,
            schema_repo_token,
            schemas_path,
            hooks,
        })
    }
}

/// Parse `event=hook-name` pairs separated by commas.
fn parse_hooks(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(event, hook)| (event.trim().to_string(), hook.trim().to_string()))
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "hook mapping".into(),
                        format!("expected 'event=hook', got '{pair}'"),
                    )
                })
        })
        .collect()
}

fn require<F>(reader: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    reader(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

fn parse_u64<F>(reader: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match reader(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
