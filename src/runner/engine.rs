//! Execution engine
//!
//! Walks a Config's task tree following a [`Selection`], or each node's own
//! children once the selection is exhausted, and dispatches leaf actions
//! through the [`ActionRegistry`].
//!
//! Concurrent groups are always allowed to settle: a failing unit does not
//! cancel its siblings, and every failure of the group is reported together.
//! Sequential groups stop at the first failure.

use crate::config::{Action, ActionId, Config, Scope, TaskId};
use crate::error::{settle, CohesionError, Result};
use crate::plugin::PluginCatalog;
use crate::runner::args::Selection;
use crate::runner::command::{CommandRunner, ShellRunner};
use crate::runner::context::{ExecParams, Reporter};
use crate::runner::registry::{ActionContext, ActionRegistry};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::debug;

/// Drives execution of registered Configs
#[derive(Clone)]
pub struct Engine {
    registry: Arc<ActionRegistry>,
    catalog: Arc<PluginCatalog>,
    runner: Arc<dyn CommandRunner>,
    reporter: Reporter,
    dry_run: bool,
}

impl Engine {
    pub fn new(registry: ActionRegistry) -> Self {
        Engine {
            registry: Arc::new(registry),
            catalog: Arc::new(PluginCatalog::builtin()),
            runner: Arc::new(ShellRunner),
            reporter: Reporter::default(),
            dry_run: false,
        }
    }

    /// Replace the collaborator that runs shell commands
    pub fn with_runner<R: CommandRunner + 'static>(mut self, runner: R) -> Self {
        self.runner = Arc::new(runner);
        self
    }

    /// Plugins that discovered Configs may reference
    pub fn with_catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Echo commands without running them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// An engine sharing this one's runner and output, whose registry holds
    /// `std` plus the plugins `config` declares
    pub fn for_config(&self, config: &Config) -> Result<Engine> {
        let registry = self.catalog.build_registry(&config.plugins)?;
        debug!(config = %config.source, types = ?registry.types(), "built module registry");
        Ok(Engine {
            registry: Arc::new(registry),
            ..self.clone()
        })
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn reporter(&self) -> Reporter {
        self.reporter
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run each selection in turn against the Config; no selections runs its defaults
    pub async fn run(
        &self,
        config: &Arc<Config>,
        selections: &[Selection],
        params: &ExecParams,
    ) -> Result<()> {
        if selections.is_empty() {
            return self.exec(config, &Selection::default(), params).await;
        }
        for selection in selections {
            self.exec(config, selection, params).await?;
        }
        Ok(())
    }

    /// Execute a Config with a selection
    pub async fn exec(
        &self,
        config: &Arc<Config>,
        selection: &Selection,
        params: &ExecParams,
    ) -> Result<()> {
        self.exec_scope(config, Scope::Config, selection.clone(), params.clone())
            .await
    }

    /// Execute a Config or one of its tasks
    pub fn exec_scope<'a>(
        &'a self,
        config: &'a Arc<Config>,
        scope: Scope,
        selection: Selection,
        params: ExecParams,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if !selection.is_empty() {
                return self.exec_selection(config, scope, &selection, &params).await;
            }

            let parallel = config.scope_parallel(scope);
            let actions = config.scope_actions(scope);

            if !actions.is_empty() {
                let run = |id: ActionId| self.exec_action(config, config.action(id), &params);
                if parallel {
                    return settle(join_all(actions.iter().copied().map(run)).await);
                }
                for id in actions.iter().copied() {
                    run(id).await?;
                }
                return Ok(());
            }

            let run = |id: TaskId| {
                let task = config.task(id);
                self.exec_scope(
                    config,
                    Scope::Task(id),
                    Selection::default(),
                    params.descend(&task.name),
                )
            };
            let tasks = config.scope_tasks(scope);
            if parallel {
                return settle(join_all(tasks.iter().copied().map(run)).await);
            }
            for id in tasks.iter().copied() {
                run(id).await?;
            }
            Ok(())
        }
        .boxed()
    }

    /// Groups of the current level run concurrently; names inside a group in sequence
    async fn exec_selection(
        &self,
        config: &Arc<Config>,
        scope: Scope,
        selection: &Selection,
        params: &ExecParams,
    ) -> Result<()> {
        let next = selection.advance();

        let groups = selection.groups().iter().map(|group| {
            let next = &next;
            async move {
                for name in group {
                    match config.find_task(scope, name) {
                        Some(id) => {
                            self.exec_scope(config, Scope::Task(id), next.clone(), params.descend(name))
                                .await?
                        }
                        None => debug!(task = %name, config = %config.source, "no matching task, skipping"),
                    }
                }
                Ok::<(), CohesionError>(())
            }
        });

        settle(join_all(groups).await)
    }

    /// Execute one action through its registered handler
    pub async fn exec_action(
        &self,
        config: &Arc<Config>,
        action: &Action,
        params: &ExecParams,
    ) -> Result<()> {
        let handler = self.registry.resolve(&action.kind)?;
        debug!(kind = %action.kind, label = ?params.label, "executing action");

        let ctx = ActionContext {
            engine: self,
            config,
            action,
        };
        handler.execute(&ctx, params).await
    }
}
