//! Built-in extension points and the config-to-registry wiring.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use berth_provisioning::{
    ContextPatch, HookEvent, HookRegistry, ProvisionError, ProvisionHook, ProvisioningContext,
};
use tracing::{info, warn};

use crate::config::ResourceConfig;

/// Logs the request identity and changes nothing. Useful as an audit
/// point on any event.
struct LogHook;

#[async_trait]
impl ProvisionHook for LogHook {
    async fn call(&self, ctx: &ProvisioningContext) -> Result<ContextPatch, ProvisionError> {
        info!(
            resource = %ctx.resource,
            operation = %ctx.operation,
            cluster = %ctx.cluster,
            namespace = %ctx.namespace,
            name = %ctx.name,
            "provisioning hook"
        );
        Ok(ContextPatch::default())
    }
}

fn builtin_hooks() -> HashMap<&'static str, Arc<dyn ProvisionHook>> {
    HashMap::from([("log", Arc::new(LogHook) as Arc<dyn ProvisionHook>)])
}

/// Build the injected hook registry for one resource from its configured
/// `event=hook-name` pairs. Unknown events or hook names are skipped
/// with a warning rather than failing boot.
pub fn build_registry(config: &ResourceConfig) -> HookRegistry {
    let builtins = builtin_hooks();
    let mut registry = HookRegistry::new();
    for (event_name, hook_name) in &config.hooks {
        let Some(event) = HookEvent::parse(event_name) else {
            warn!(
                resource = %config.name,
                event = %event_name,
                "unknown hook event in configuration, skipping"
            );
            continue;
        };
        let Some(hook) = builtins.get(hook_name.as_str()) else {
            warn!(
                resource = %config.name,
                event = %event_name,
                hook = %hook_name,
                "unknown hook name in configuration, skipping"
            );
            continue;
        };
        registry.insert(event, Arc::clone(hook));
    }
    registry
}
