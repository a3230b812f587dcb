//! Built-in action types
//!
//! The `std` plugin provides `exec`, `delegate.local`, `delegate`, `watch`,
//! `fs.copy`, `fs.empty` and `deno`. The `node` plugin provides `node.script`.

pub mod delegate;
pub mod deno;
pub mod exec;
pub mod fs;
pub mod node;
pub mod watch;

use crate::config::ActionOptions;
use crate::error::{ExecutionError, RegistryResult, Result};
use crate::plugin::{Plugin, STD_PLUGIN};
use crate::runner::{ActionContext, ActionRegistry, CommandRequest, ExecParams};
use std::collections::HashMap;
use tracing::debug;

pub use delegate::{DelegateAction, LocalDelegateAction};
pub use deno::DenoAction;
pub use exec::ExecAction;
pub use fs::{CopyAction, EmptyAction};
pub use node::{NodePlugin, NodeScriptAction};
pub use watch::WatchAction;

/// Plugin registering the standard action types
#[derive(Debug, Clone, Copy, Default)]
pub struct StdPlugin;

impl Plugin for StdPlugin {
    fn name(&self) -> &str {
        STD_PLUGIN
    }

    fn register_actions(
        &self,
        _options: &ActionOptions,
        registry: &mut ActionRegistry,
    ) -> RegistryResult<()> {
        registry.register("exec", ExecAction)?;
        registry.register("delegate.local", LocalDelegateAction)?;
        registry.register("delegate", DelegateAction)?;
        registry.register("watch", WatchAction)?;
        registry.register("fs.copy", CopyAction)?;
        registry.register("fs.empty", EmptyAction)?;
        registry.register("deno", DenoAction)?;
        Ok(())
    }
}

/// Echo and run one shell command in the action's Config directory
pub(crate) async fn run_shell(
    ctx: &ActionContext<'_>,
    params: &ExecParams,
    command: &str,
    env: HashMap<String, String>,
    ignore_exit_code: bool,
) -> Result<()> {
    ctx.reporter()
        .command(params.label.as_deref(), command, ctx.cwd());

    if ctx.engine.is_dry_run() {
        return Ok(());
    }

    let outcome = ctx
        .engine
        .runner()
        .run(CommandRequest {
            command: command.to_string(),
            cwd: ctx.cwd().to_path_buf(),
            env,
            label: params.label.clone(),
            output: params.output.clone(),
        })
        .await?;

    if !outcome.success() {
        if ignore_exit_code {
            debug!(command, code = ?outcome.code, "ignoring exit code");
        } else {
            return Err(ExecutionError::CommandFailed {
                command: command.to_string(),
                code: outcome.code,
            }
            .into());
        }
    }

    Ok(())
}
