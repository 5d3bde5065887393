//! Provisioning control plane server.
//!
//! Boot sequence: load config, build the typed clients, load every
//! resource's schema set, materialize the route tables, spawn one schema
//! sync loop per resource, then serve until shutdown.

mod config;
mod hooks;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use berth_api::{router, AppState, ResourceState, RouteLifecycleManager};
use berth_clients::{ArgoReconciler, GitHubStore, GitStore, Reconciler, SecretStore, VaultStore};
use berth_core::RetryPolicy;
use berth_provisioning::{ClusterRegistry, ProvisioningOrchestrator};
use berth_schema::{run_sync_loop, SchemaChangeListener, SchemaSyncEngine};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });
    info!(
        listen_addr = %config.listen_addr,
        resources = config.resources.len(),
        poll_interval_secs = config.poll_interval_secs,
        "starting berth server"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let poll = Duration::from_secs(config.poll_interval_secs);
    let wait_timeout = Duration::from_secs(config.wait_timeout_secs);

    let reconciler: Arc<dyn Reconciler> = Arc::new(ArgoReconciler::new(
        &config.reconciler_url,
        config.reconciler_token.expose(),
        RetryPolicy::default(),
    ));
    let secret_store: Arc<dyn SecretStore> = Arc::new(VaultStore::new(
        &config.vault_url,
        config.vault_token.expose(),
        RetryPolicy::default(),
    ));
    let clusters = Arc::new(ClusterRegistry::new(
        Arc::clone(&reconciler),
        &config.project,
        &config.control_namespace,
    ));

    let mut resources = HashMap::new();
    let mut sync_tasks: Vec<JoinHandle<()>> = Vec::new();

    for resource in &config.resources {
        let git: Arc<dyn GitStore> = Arc::new(GitHubStore::new(
            &resource.repo_url,
            resource.repo_token.expose(),
            RetryPolicy::default(),
        ));
        let schema_git: Arc<dyn GitStore> = Arc::new(GitHubStore::new(
            &resource.schema_repo_url,
            resource.schema_repo_token.expose(),
            RetryPolicy::default(),
        ));

        let mut engine = SchemaSyncEngine::new(&resource.name, schema_git, &resource.schemas_path);
        if let Err(e) = engine.load_all().await {
            error!(resource = %resource.name, error = %e, "schema load failed");
            std::process::exit(1);
        }
        let engine = Arc::new(RwLock::new(engine));

        let manager = Arc::new(RouteLifecycleManager::new(&resource.name, Arc::clone(&engine)));
        manager.generate_routes().await;

        let orchestrator = Arc::new(ProvisioningOrchestrator::new(
            &resource.name,
            git,
            Arc::clone(&secret_store),
            Arc::clone(&reconciler),
            Arc::clone(&clusters),
            hooks::build_registry(resource),
            wait_timeout,
        ));

        sync_tasks.push(tokio::spawn(run_sync_loop(
            Arc::clone(&engine),
            poll,
            Arc::clone(&shutdown),
            Arc::clone(&manager) as Arc<dyn SchemaChangeListener>,
        )));

        resources.insert(
            resource.name.clone(),
            Arc::new(ResourceState {
                manager,
                orchestrator,
                engine,
            }),
        );
    }

    let app = router(Arc::new(AppState { resources }));
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Bind error on {}: {e}", config.listen_addr);
            std::process::exit(1);
        });
    info!(listen_addr = %config.listen_addr, "serving");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&shutdown)))
        .await;
    if let Err(e) = serve_result {
        error!(error = %e, "server error");
    }

    // The sync loops observe the flag at their next tick.
    info!("waiting for schema sync loops to stop");
    for task in sync_tasks {
        let _ = task.await;
    }
    info!("shutdown complete");
}

async fn shutdown_signal(shutdown: Arc<AtomicBool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for the shutdown signal");
        return;
    }
    info!("shutdown signal received");
    shutdown.store(true, Ordering::Relaxed);
}
