//! Extension points around the provisioning workflow.
//!
//! Hooks are an explicit, injected mapping from event to handler,
//! populated at construction time from configuration. There is no
//! discovery mechanism.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::{ContextPatch, HookEvent, ProvisioningContext};
use crate::error::ProvisionError;

/// One extension point. The returned patch overrides only the fields it
/// carries; an error aborts the request.
#[async_trait]
pub trait ProvisionHook: Send + Sync {
    async fn call(&self, ctx: &ProvisioningContext) -> Result<ContextPatch, ProvisionError>;
}

/// Injected event-to-hook mapping for one resource.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<HookEvent, Arc<dyn ProvisionHook>>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event: HookEvent, hook: Arc<dyn ProvisionHook>) {
        self.hooks.insert(event, hook);
    }

    /// Run the hook registered for `event`, if any. Hook failures are
    /// wrapped with the event name.
    pub async fn run(
        &self,
        event: HookEvent,
        ctx: &ProvisioningContext,
    ) -> Result<Option<ContextPatch>, ProvisionError> {
        let Some(hook) = self.hooks.get(&event) else {
            return Ok(None);
        };
        debug!(
            resource = %ctx.resource,
            event = %event,
            cluster = %ctx.cluster,
            namespace = %ctx.namespace,
            name = %ctx.name,
            "running hook"
        );
        let patch = hook.call(ctx).await.map_err(|e| ProvisionError::Hook {
            event: event.as_str().to_string(),
            detail: e.to_string(),
        })?;
        Ok(Some(patch))
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events: Vec<&str> = self.hooks.keys().map(HookEvent::as_str).collect();
        f.debug_struct("HookRegistry").field("events", &events).finish()
    }
}
