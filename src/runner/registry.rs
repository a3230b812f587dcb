//! Action registry
//!
//! Maps action type names to handlers. A registry is built once per
//! invocation, filled by plugins, and then shared read-only by the engine.

use crate::config::{Action, Config, Task};
use crate::error::{RegistryError, RegistryResult, Result};
use crate::runner::context::{ExecParams, Reporter};
use crate::runner::engine::Engine;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Executes every action of one type
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, ctx: &ActionContext<'_>, params: &ExecParams) -> Result<()>;
}

/// What a handler sees of the action it runs
pub struct ActionContext<'a> {
    pub engine: &'a Engine,
    pub config: &'a Arc<Config>,
    pub action: &'a Action,
}

impl<'a> ActionContext<'a> {
    /// The task owning the action, if any
    pub fn owner_task(&self) -> Option<&'a Task> {
        self.action.owner().map(|id| self.config.task(id))
    }

    /// Directory commands of this action run in
    pub fn cwd(&self) -> &'a Path {
        &self.config.path
    }

    pub fn reporter(&self) -> Reporter {
        self.engine.reporter()
    }

    /// Variables visible to the action: its owner's cascade with the
    /// invocation overrides on top
    pub async fn variables(&self, params: &ExecParams) -> Result<HashMap<String, String>> {
        let resolved = match self.action.owner() {
            Some(task) => self.config.resolve_task_variables(task).await?,
            None => self.config.resolve_variables().await?,
        };

        let mut vars = resolved.to_map();
        vars.extend(params.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(vars)
    }
}

/// Registry of action handlers keyed by type name
#[derive(Default, Clone)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; each type may be registered only once
    pub fn register<H: ActionHandler + 'static>(
        &mut self,
        kind: impl Into<String>,
        handler: H,
    ) -> RegistryResult<()> {
        let kind = kind.into();
        if self.handlers.contains_key(&kind) {
            return Err(RegistryError::DuplicateActionRegistration(kind));
        }
        self.handlers.insert(kind, Arc::new(handler));
        Ok(())
    }

    /// Look up the handler of a type
    pub fn resolve(&self, kind: &str) -> RegistryResult<Arc<dyn ActionHandler>> {
        self.handlers
            .get(kind)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownActionType(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("types", &self.types())
            .finish()
    }
}
