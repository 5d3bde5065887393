//! Workflow ordering and idempotence against in-memory backends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use berth_clients::{ChangedFile, GitStore, Reconciler, SecretStore};
use berth_core::{Backend, ServiceError};
use berth_provisioning::{
    ClusterRegistry, ContextPatch, HookEvent, HookRegistry, ProvisionError, ProvisionHook,
    ProvisionOutcome, ProvisioningContext, ProvisioningOrchestrator,
};
use serde_json::{json, Value};

type EventLog = Arc<Mutex<Vec<String>>>;

fn log_event(log: &EventLog, event: String) {
    log.lock().unwrap().push(event);
}

struct FakeGit {
    log: EventLog,
    files: Mutex<HashMap<String, String>>,
}

impl FakeGit {
    fn new(log: EventLog) -> Self {
        Self {
            log,
            files: Mutex::new(HashMap::new()),
        }
    }

    fn seed(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }
}

#[async_trait]
impl GitStore for FakeGit {
    async fn list_dir(&self, _path: &str) -> Result<Vec<(String, String)>, ServiceError> {
        Ok(Vec::new())
    }

    async fn get_file_content(&self, path: &str) -> Result<String, ServiceError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(Backend::ConfigStore, path))
    }

    async fn create_file(&self, path: &str, _msg: &str, content: &str) -> Result<(), ServiceError> {
        log_event(&self.log, format!("git.create {path}"));
        self.seed(path, content);
        Ok(())
    }

    async fn modify_file(&self, path: &str, _msg: &str, content: &str) -> Result<(), ServiceError> {
        log_event(&self.log, format!("git.modify {path}"));
        self.seed(path, content);
        Ok(())
    }

    async fn delete_file(&self, path: &str, _msg: &str) -> Result<(), ServiceError> {
        log_event(&self.log, format!("git.delete {path}"));
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    async fn get_changed_files(
        &self,
        _path: &str,
        _since: &str,
        _until: &str,
    ) -> Result<Vec<ChangedFile>, ServiceError> {
        Ok(Vec::new())
    }

    async fn head(&self) -> Result<String, ServiceError> {
        Ok("0".to_string())
    }
}

struct FakeSecrets {
    log: EventLog,
}

#[async_trait]
impl SecretStore for FakeSecrets {
    async fn read_secret(&self, _path: &str) -> Result<HashMap<String, String>, ServiceError> {
        Ok(HashMap::new())
    }

    async fn write_secret(
        &self,
        path: &str,
        _data: &HashMap<String, String>,
    ) -> Result<(), ServiceError> {
        log_event(&self.log, format!("secrets.write {path}"));
        Ok(())
    }

    async fn delete_secret(&self, path: &str) -> Result<(), ServiceError> {
        log_event(&self.log, format!("secrets.delete {path}"));
        Ok(())
    }
}

/// Reconciler whose application visibility flips after a fixed number of
/// `get_application` probes.
struct FakeReconciler {
    log: EventLog,
    cluster_values: Mutex<HashMap<String, String>>,
    initially_visible: bool,
    gets_until_flip: AtomicUsize,
}

impl FakeReconciler {
    fn new(log: EventLog, initially_visible: bool, gets_until_flip: usize) -> Self {
        Self {
            log,
            cluster_values: Mutex::new(HashMap::new()),
            initially_visible,
            gets_until_flip: AtomicUsize::new(gets_until_flip),
        }
    }

    fn seed_cluster_values(&self, app: &str, yaml: &str) {
        self.cluster_values
            .lock()
            .unwrap()
            .insert(app.to_string(), yaml.to_string());
    }
}

#[async_trait]
impl Reconciler for FakeReconciler {
    async fn get_application(&self, name: &str) -> Result<Value, ServiceError> {
        log_event(&self.log, format!("reconciler.get {name}"));
        let remaining = self.gets_until_flip.load(Ordering::SeqCst);
        let visible = if remaining > 0 {
            if remaining != usize::MAX {
                self.gets_until_flip.store(remaining - 1, Ordering::SeqCst);
            }
            self.initially_visible
        } else {
            !self.initially_visible
        };
        if visible {
            Ok(json!({"status": {"sync": {"status": "Synced", "revision": "1.0.0"}}}))
        } else {
            Err(ServiceError::not_found(Backend::Reconciler, name))
        }
    }

    async fn sync_application(&self, name: &str) -> Result<(), ServiceError> {
        log_event(&self.log, format!("reconciler.sync {name}"));
        Ok(())
    }

    async fn patch_application_values(
        &self,
        values: &Value,
        name: &str,
        _namespace: &str,
        _project: &str,
    ) -> Result<(), ServiceError> {
        log_event(&self.log, format!("reconciler.patch {name}"));
        let yaml = serde_yaml::to_string(values).unwrap();
        self.seed_cluster_values(name, &yaml);
        Ok(())
    }

    async fn get_application_values(&self, name: &str) -> Result<String, ServiceError> {
        self.cluster_values
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(Backend::Reconciler, name))
    }
}

struct Harness {
    log: EventLog,
    git: Arc<FakeGit>,
    reconciler: Arc<FakeReconciler>,
    orchestrator: ProvisioningOrchestrator,
}

fn harness(initially_visible: bool, gets_until_flip: usize, hooks: HookRegistry) -> Harness {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let git = Arc::new(FakeGit::new(Arc::clone(&log)));
    let secrets = Arc::new(FakeSecrets {
        log: Arc::clone(&log),
    });
    let reconciler = Arc::new(FakeReconciler::new(
        Arc::clone(&log),
        initially_visible,
        gets_until_flip,
    ));
    reconciler.seed_cluster_values("eu-cluster-config", "allowedNamespaces: []\n");
    let clusters = Arc::new(ClusterRegistry::new(
        Arc::clone(&reconciler) as Arc<dyn Reconciler>,
        "platform",
        "argocd",
    ));
    let orchestrator = ProvisioningOrchestrator::new(
        "redis",
        Arc::clone(&git) as Arc<dyn GitStore>,
        secrets,
        Arc::clone(&reconciler) as Arc<dyn Reconciler>,
        clusters,
        hooks,
        Duration::from_secs(3),
    );
    Harness {
        log,
        git,
        reconciler,
        orchestrator,
    }
}

fn create_payload() -> Value {
    json!({
        "cluster": "eu",
        "namespace": "team-a",
        "applicationName": "svc1",
        "size": 1,
        "secrets": {"password": "hunter2"},
    })
}

fn position(log: &[String], event: &str) -> usize {
    log.iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("event '{event}' not in log: {log:?}"))
}

#[tokio::test(start_paused = true)]
async fn create_registers_new_namespace_before_instance_sync() {
    let h = harness(false, 2, HookRegistry::new());

    let outcome = h.orchestrator.create("1.0.0", create_payload()).await.unwrap();
    let ProvisionOutcome::Accepted { message } = outcome else {
        panic!("expected acceptance");
    };
    assert!(message.contains("svc1"));
    assert!(message.contains("eu"));
    assert!(message.contains("team-a"));

    let log = h.log.lock().unwrap().clone();
    let cluster_patch = position(&log, "reconciler.patch eu-cluster-config");
    let cluster_sync = position(&log, "reconciler.sync eu-cluster-config");
    let config_write = position(&log, "git.create eu/team-a/svc1.yaml");
    let secret_write = position(&log, "secrets.write redis/eu/team-a/svc1");
    let instance_sync = position(&log, "reconciler.sync eu-team-a-redis-svc1");

    assert!(cluster_patch < cluster_sync);
    assert!(cluster_sync < config_write);
    assert!(config_write < secret_write);
    assert!(secret_write < instance_sync);
}

#[tokio::test(start_paused = true)]
async fn create_skips_registration_for_a_known_namespace() {
    let h = harness(false, 0, HookRegistry::new());
    h.reconciler
        .seed_cluster_values("eu-cluster-config", "allowedNamespaces:\n- team-a\n");

    h.orchestrator.create("1.0.0", create_payload()).await.unwrap();

    let log = h.log.lock().unwrap().clone();
    assert!(!log.iter().any(|e| e.starts_with("reconciler.patch")));
    assert!(!log.iter().any(|e| e == "reconciler.sync eu-cluster-config"));
}

#[tokio::test]
async fn reordered_update_is_a_no_op_with_zero_writes() {
    let h = harness(true, usize::MAX, HookRegistry::new());
    let stored = serde_yaml::to_string(&json!({"plan": "small", "size": 1})).unwrap();
    h.git.seed("eu/team-a/svc1.yaml", &stored);

    let outcome = h
        .orchestrator
        .update(
            "1.0.0",
            json!({
                "cluster": "eu",
                "namespace": "team-a",
                "applicationName": "svc1",
                "size": 1,
                "plan": "small",
            }),
        )
        .await
        .unwrap();

    let ProvisionOutcome::NoOp { values, .. } = outcome else {
        panic!("expected a no-op");
    };
    assert_eq!(values["plan"], json!("small"));
    assert!(h.log.lock().unwrap().is_empty(), "no writes expected");
}

#[tokio::test(start_paused = true)]
async fn changed_update_modifies_the_config_file() {
    let h = harness(true, usize::MAX, HookRegistry::new());
    let stored = serde_yaml::to_string(&json!({"size": 1})).unwrap();
    h.git.seed("eu/team-a/svc1.yaml", &stored);

    let outcome = h
        .orchestrator
        .update(
            "1.0.0",
            json!({
                "cluster": "eu",
                "namespace": "team-a",
                "applicationName": "svc1",
                "size": 2,
            }),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, ProvisionOutcome::Accepted { .. }));
    let log = h.log.lock().unwrap().clone();
    let modify = position(&log, "git.modify eu/team-a/svc1.yaml");
    let sync = position(&log, "reconciler.sync eu-team-a-redis-svc1");
    assert!(modify < sync);
}

#[tokio::test(start_paused = true)]
async fn delete_waits_for_gone_before_secret_cleanup() {
    let h = harness(true, 2, HookRegistry::new());

    h.orchestrator.delete("eu", "team-a", "svc1").await.unwrap();

    let log = h.log.lock().unwrap().clone();
    let config_delete = position(&log, "git.delete eu/team-a/svc1.yaml");
    let sync = position(&log, "reconciler.sync eu-team-a-redis-svc1");
    let secret_delete = position(&log, "secrets.delete redis/eu/team-a/svc1");
    let last_poll = log
        .iter()
        .rposition(|e| e == "reconciler.get eu-team-a-redis-svc1")
        .unwrap();

    assert!(config_delete < sync);
    assert!(sync < secret_delete);
    assert!(last_poll < secret_delete, "secrets deleted before the gone confirmation");
    assert_eq!(
        log.iter().filter(|e| e.starts_with("secrets.delete")).count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn delete_times_out_when_the_application_never_disappears() {
    let h = harness(true, usize::MAX, HookRegistry::new());

    let err = h
        .orchestrator
        .delete("eu", "team-a", "svc1")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::Service(ServiceError::Timeout { .. })
    ));
    let log = h.log.lock().unwrap().clone();
    assert!(!log.iter().any(|e| e.starts_with("secrets.delete")));
}

struct RenameHook;

#[async_trait]
impl ProvisionHook for RenameHook {
    async fn call(&self, _ctx: &ProvisioningContext) -> Result<ContextPatch, ProvisionError> {
        Ok(ContextPatch {
            name: Some("svc2".to_string()),
            ..ContextPatch::default()
        })
    }
}

#[tokio::test(start_paused = true)]
async fn pre_hook_identity_override_recomputes_derived_fields() {
    let mut hooks = HookRegistry::new();
    hooks.insert(HookEvent::PreCreate, Arc::new(RenameHook));
    let h = harness(false, 0, hooks);

    h.orchestrator.create("1.0.0", create_payload()).await.unwrap();

    let log = h.log.lock().unwrap().clone();
    assert!(log.iter().any(|e| e == "git.create eu/team-a/svc2.yaml"));
    assert!(log.iter().any(|e| e == "reconciler.sync eu-team-a-redis-svc2"));
}

#[tokio::test]
async fn status_reads_the_sync_state() {
    let h = harness(true, usize::MAX, HookRegistry::new());
    let status = h.orchestrator.status("eu", "team-a", "svc1").await.unwrap();
    assert_eq!(status.status, "Synced");
    assert_eq!(status.version, "1.0.0");
}
