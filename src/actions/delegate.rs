//! `delegate.local` and `delegate`: re-enter the selection grammar
//!
//! `delegate.local` runs selections against the action's own Config, or its
//! owning task when `relative` is set. `delegate` fans a selection out across
//! every Config discovered through the Config's modules, in dependency order.

use crate::config::types::one_or_many;
use crate::config::{collect_configs, order_configs, Inclusion, Scope};
use crate::error::{settle, ExecutionError, Result};
use crate::runner::{interpolate_map, ActionContext, ActionHandler, ExecParams, Selection};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LocalDelegateOptions {
    #[serde(deserialize_with = "one_or_many")]
    task: Vec<String>,
    #[serde(default)]
    relative: bool,
    #[serde(default)]
    parallel: bool,
    #[serde(default)]
    variables: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DelegateOptions {
    #[serde(default, deserialize_with = "one_or_many")]
    task: Vec<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    included: Inclusion,
    #[serde(default)]
    parallel: bool,
    #[serde(default)]
    variables: BTreeMap<String, String>,
}

/// Render forwarded variables against the action's variables and layer them
/// onto the invocation overrides
async fn forward(
    ctx: &ActionContext<'_>,
    params: &ExecParams,
    variables: &BTreeMap<String, String>,
) -> Result<ExecParams> {
    if variables.is_empty() {
        return Ok(params.clone());
    }
    let vars = ctx.variables(params).await?;
    let forwarded = interpolate_map(variables, &vars)?;
    Ok(params.overriding(forwarded))
}

/// Runs selections against the same Config or the owning task
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDelegateAction;

#[async_trait]
impl ActionHandler for LocalDelegateAction {
    async fn execute(&self, ctx: &ActionContext<'_>, params: &ExecParams) -> Result<()> {
        let options: LocalDelegateOptions = ctx.action.parse_options()?;
        let params = forward(ctx, params, &options.variables).await?;

        let scope = match ctx.action.owner() {
            Some(task) if options.relative => Scope::Task(task),
            _ => Scope::Config,
        };

        let runs = Selection::parse_many(&options.task)
            .into_iter()
            .map(|selection| ctx.engine.exec_scope(ctx.config, scope, selection, params.clone()));

        if options.parallel {
            return settle(join_all(runs).await);
        }
        for run in runs {
            run.await?;
        }
        Ok(())
    }
}

/// Runs a selection in every discovered module
#[derive(Debug, Clone, Copy, Default)]
pub struct DelegateAction;

#[async_trait]
impl ActionHandler for DelegateAction {
    async fn execute(&self, ctx: &ActionContext<'_>, params: &ExecParams) -> Result<()> {
        let options: DelegateOptions = ctx.action.parse_options()?;

        let tasks = if !options.task.is_empty() {
            options.task.clone()
        } else if let Some(task) = ctx.owner_task() {
            vec![task.name.clone()]
        } else {
            return Err(ExecutionError::NoDelegatedTask.into());
        };

        let configs = collect_configs(ctx.config).await?;

        // The Config's own rules win over the action's
        let mut dependencies = options.dependencies.clone();
        dependencies.extend(ctx.config.dependencies.clone());

        let configs = if dependencies.is_empty() {
            configs
        } else {
            order_configs(configs, &dependencies)?
        };
        let configs = options.included.filter(configs);
        debug!(
            modules = configs.len(),
            tasks = ?tasks,
            "delegating to modules"
        );

        let params = forward(ctx, params, &options.variables).await?;

        // Each module runs with its own plugins on top of std
        let engines = configs
            .iter()
            .map(|config| ctx.engine.for_config(config))
            .collect::<Result<Vec<_>>>()?;

        for task in &tasks {
            let selection = Selection::parse(task);
            let runs = configs.iter().zip(&engines).map(|(config, engine)| {
                let params = params.delegate(config.pathspec().unwrap_or("."));
                let selection = &selection;
                async move { engine.exec(config, selection, &params).await }
            });

            if options.parallel {
                settle(join_all(runs).await)?;
            } else {
                for run in runs {
                    run.await?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::{engine, RecordingRunner};
    use crate::config::load_config;
    use crate::error::CohesionError;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_local_delegate_runs_selections() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "cohesion.yml",
            r#"
variables:
  profile: debug
tasks:
  - name: lint
    actions: ["lint ${profile}"]
  - name: test
    actions: ["test ${profile}"]
  - name: ci
    actions:
      - type: delegate.local
        task: [lint, test]
        variables:
          profile: ci-${profile}
"#,
        );

        let runner = RecordingRunner::default();
        let engine = engine(&runner);
        let config = load_config("cohesion.yml", dir.path()).await.unwrap();

        engine
            .exec(&config, &Selection::parse("ci"), &ExecParams::new())
            .await
            .unwrap();
        assert_eq!(runner.commands(), vec!["lint ci-debug", "test ci-debug"]);
    }

    #[tokio::test]
    async fn test_relative_local_delegate_targets_owning_task() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "cohesion.yml",
            r#"
tasks:
  - name: web
    actions: ["echo top-level web"]
  - name: absolute
    tasks:
      - name: web
        actions: ["echo unused web"]
    actions:
      - type: delegate.local
        task: web
  - name: relative
    tasks:
      - name: web
        actions: ["echo nested web"]
    actions:
      - type: delegate.local
        task: web
        relative: true
"#,
        );

        let runner = RecordingRunner::default();
        let engine = engine(&runner);
        let config = load_config("cohesion.yml", dir.path()).await.unwrap();

        engine
            .exec(&config, &Selection::parse("absolute"), &ExecParams::new())
            .await
            .unwrap();
        assert_eq!(runner.commands(), vec!["echo top-level web"]);

        engine
            .exec(&config, &Selection::parse("relative"), &ExecParams::new())
            .await
            .unwrap();
        assert_eq!(runner.commands(), vec!["echo top-level web", "echo nested web"]);
        assert_eq!(runner.last().label.as_deref(), Some("relative.web"));
    }

    #[tokio::test]
    async fn test_parallel_local_delegate_settles() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "cohesion.yml",
            r#"
tasks:
  - name: a
    actions: ["fail a"]
  - name: b
    actions: ["echo b"]
  - name: all
    actions:
      - type: delegate.local
        task: [a, b]
        parallel: true
"#,
        );

        let runner = RecordingRunner::default();
        let engine = engine(&runner);
        let config = load_config("cohesion.yml", dir.path()).await.unwrap();

        let result = engine
            .exec(&config, &Selection::parse("all"), &ExecParams::new())
            .await;
        assert!(result.is_err());

        let mut commands = runner.commands();
        commands.sort();
        assert_eq!(commands, vec!["echo b", "fail a"]);
    }

    fn monorepo(dir: &Path, delegate: &str) {
        write(
            dir,
            "cohesion.yml",
            &format!(
                r#"
modules:
  - patterns: ["packages/*"]
    labels:
      kind: package
dependencies:
  "packages/app": ["packages/lib*"]
tasks:
  - name: build
    actions:
      - {}
"#,
                delegate
            ),
        );
        write(dir, "packages/app/cohesion.yml", "tasks:\n  - name: build\n    actions: [\"build app\"]\n");
        write(
            dir,
            "packages/lib-a/cohesion.yml",
            "labels:\n  env: [prod, east]\ntasks:\n  - name: build\n    actions: [\"build lib-a\"]\n",
        );
        write(dir, "packages/lib-b/cohesion.yml", "tasks:\n  - name: build\n    actions: [\"build lib-b\"]\n");
    }

    #[tokio::test]
    async fn test_delegate_orders_modules_by_dependencies() {
        let dir = TempDir::new().unwrap();
        monorepo(dir.path(), "{ type: delegate }");

        let runner = RecordingRunner::default();
        let engine = engine(&runner);
        let config = load_config("cohesion.yml", dir.path()).await.unwrap();

        engine
            .exec(&config, &Selection::parse("build"), &ExecParams::new())
            .await
            .unwrap();

        assert_eq!(
            runner.commands(),
            vec!["build lib-a", "build lib-b", "build app"]
        );

        let requests = runner.requests.lock().unwrap();
        assert_eq!(requests[0].label.as_deref(), Some("build/packages/lib-a.build"));
        assert_eq!(requests[0].cwd, dir.path().join("packages/lib-a"));
    }

    #[tokio::test]
    async fn test_delegate_inclusion_filter() {
        let dir = TempDir::new().unwrap();
        monorepo(
            dir.path(),
            r#"{ type: delegate, task: build, included: { env: "prod,east" } }"#,
        );

        let runner = RecordingRunner::default();
        let engine = engine(&runner);
        let config = load_config("cohesion.yml", dir.path()).await.unwrap();

        engine
            .exec(&config, &Selection::parse("build"), &ExecParams::new())
            .await
            .unwrap();
        assert_eq!(runner.commands(), vec!["build lib-a"]);
    }

    #[tokio::test]
    async fn test_delegate_without_task_fails() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "cohesion.yml", "actions:\n  - type: delegate\n");

        let runner = RecordingRunner::default();
        let engine = engine(&runner);
        let config = load_config("cohesion.yml", dir.path()).await.unwrap();

        let result = engine
            .exec(&config, &Selection::default(), &ExecParams::new())
            .await;
        assert!(matches!(
            result,
            Err(CohesionError::Execution(ExecutionError::NoDelegatedTask))
        ));
    }

    #[tokio::test]
    async fn test_delegate_cycle_is_reported() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "cohesion.yml",
            r#"
modules: ["packages/*"]
dependencies:
  packages/a: [packages/b]
  packages/b: [packages/a]
actions:
  - { type: delegate, task: build }
"#,
        );
        write(dir.path(), "packages/a/cohesion.yml", "tasks: []\n");
        write(dir.path(), "packages/b/cohesion.yml", "tasks: []\n");

        let runner = RecordingRunner::default();
        let engine = engine(&runner);
        let config = load_config("cohesion.yml", dir.path()).await.unwrap();

        let result = engine
            .exec(&config, &Selection::default(), &ExecParams::new())
            .await;
        assert!(matches!(
            result,
            Err(CohesionError::Execution(ExecutionError::DependencyCycle(_)))
        ));
        assert!(runner.commands().is_empty());
    }
}
