//! `exec`: run shell commands

use crate::actions::run_shell;
use crate::config::types::one_or_many;
use crate::error::{ExecutionError, Result};
use crate::runner::{interpolate, interpolate_map, ActionContext, ActionHandler, ExecParams};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ExecOptions {
    cmd: Option<String>,
    #[serde(default)]
    commands: Vec<ExecCommand>,
    #[serde(default, deserialize_with = "one_or_many")]
    platforms: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "one_or_many")]
    required_variables: Vec<String>,
    #[serde(default)]
    ignore_exit_code: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExecCommand {
    Plain(String),
    Detailed(DetailedCommand),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetailedCommand {
    cmd: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    platforms: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

struct Step<'a> {
    cmd: Option<&'a str>,
    platforms: &'a [String],
    env: Option<&'a BTreeMap<String, String>>,
}

/// Runs `cmd`, then every entry of `commands`, in sequence.
///
/// Each command may be restricted to platforms. Required variables are
/// checked before anything runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecAction;

#[async_trait]
impl ActionHandler for ExecAction {
    async fn execute(&self, ctx: &ActionContext<'_>, params: &ExecParams) -> Result<()> {
        let options: ExecOptions = ctx.action.parse_options()?;
        let vars = ctx.variables(params).await?;

        for name in &options.required_variables {
            if vars.get(name).map_or(true, |value| value.is_empty()) {
                return Err(ExecutionError::MissingRequiredVariable(name.clone()).into());
            }
        }

        let base_env = interpolate_map(&options.env, &vars)?;

        let mut steps: Vec<Step<'_>> = vec![Step {
            cmd: options.cmd.as_deref(),
            platforms: options.platforms.as_slice(),
            env: None,
        }];
        for command in &options.commands {
            steps.push(match command {
                ExecCommand::Plain(cmd) => Step {
                    cmd: Some(cmd.as_str()),
                    platforms: &[],
                    env: None,
                },
                ExecCommand::Detailed(detail) => Step {
                    cmd: detail.cmd.as_deref(),
                    platforms: detail.platforms.as_slice(),
                    env: Some(&detail.env),
                },
            });
        }

        for Step { cmd, platforms, env } in steps {
            let Some(cmd) = cmd else { continue };
            if !platform_matches(platforms) {
                continue;
            }

            let command = interpolate(cmd, &vars)?;

            let mut child_env = vars.clone();
            child_env.extend(base_env.clone());
            if let Some(env) = env {
                child_env.extend(interpolate_map(env, &vars)?);
            }

            run_shell(ctx, params, &command, child_env, options.ignore_exit_code).await?;
        }

        Ok(())
    }
}

/// Whether the current platform is in the list; an empty list matches every platform.
///
/// Both Rust (`macos`, `windows`) and Node (`darwin`, `win32`) names are accepted.
pub fn platform_matches(platforms: &[String]) -> bool {
    platforms.is_empty()
        || platforms
            .iter()
            .any(|p| normalize_platform(p) == std::env::consts::OS)
}

fn normalize_platform(name: &str) -> &str {
    match name {
        "darwin" => "macos",
        "win32" => "windows",
        "sunos" => "solaris",
        other => other,
    }
}
