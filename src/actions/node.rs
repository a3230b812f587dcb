//! The `node` plugin: run package.json scripts with the project's package manager

use crate::actions::run_shell;
use crate::config::ActionOptions;
use crate::error::{ConfigError, RegistryResult, Result};
use crate::plugin::Plugin;
use crate::runner::{interpolate, ActionContext, ActionHandler, ActionRegistry, ExecParams};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

const DEFAULT_EXEC: &str = "npm";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct NodeScriptOptions {
    script: String,
    exec: Option<String>,
    default_exec: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageManifest {
    package_manager: Option<String>,
}

fn package_manager_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(npm|pnpm|yarn)@\d+\.\d+\.\d+(-.+)?").expect("package manager pattern is valid")
    })
}

/// Plugin providing `node.script`
///
/// Accepts a `defaultExec` option used when neither the action nor any
/// `package.json` names a package manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodePlugin;

impl Plugin for NodePlugin {
    fn name(&self) -> &str {
        "node"
    }

    fn register_actions(
        &self,
        options: &ActionOptions,
        registry: &mut ActionRegistry,
    ) -> RegistryResult<()> {
        let default_exec = options
            .get("defaultExec")
            .and_then(|value| value.as_str())
            .map(str::to_string);

        registry.register("node.script", NodeScriptAction { default_exec })
    }
}

/// Runs `<package manager> run <script>` in the Config directory
#[derive(Debug, Clone, Default)]
pub struct NodeScriptAction {
    default_exec: Option<String>,
}

#[async_trait]
impl ActionHandler for NodeScriptAction {
    async fn execute(&self, ctx: &ActionContext<'_>, params: &ExecParams) -> Result<()> {
        let options: NodeScriptOptions = ctx.action.parse_options()?;
        let vars = ctx.variables(params).await?;

        let exec = match options.exec {
            Some(exec) => exec,
            None => match find_package_manager(ctx.cwd()).await? {
                Some(manager) => manager,
                None => options
                    .default_exec
                    .or_else(|| self.default_exec.clone())
                    .unwrap_or_else(|| DEFAULT_EXEC.to_string()),
            },
        };

        let script = interpolate(&options.script, &vars)?;
        run_shell(ctx, params, &format!("{} run {}", exec, script), vars, false).await
    }
}

/// Package manager named by the nearest `package.json` declaring one
pub async fn find_package_manager(start: &Path) -> Result<Option<String>> {
    for dir in start.ancestors() {
        let manifest_path = dir.join("package.json");
        if !tokio::fs::try_exists(&manifest_path).await? {
            continue;
        }

        let content = tokio::fs::read_to_string(&manifest_path).await?;
        let manifest: PackageManifest = serde_json::from_str(&content).map_err(|e| {
            ConfigError::Load {
                uri: manifest_path.display().to_string(),
                error: e.to_string(),
            }
        })?;

        let Some(value) = manifest.package_manager else {
            continue;
        };
        let Some(caps) = package_manager_pattern().captures(&value) else {
            return Err(ConfigError::Invalid(format!(
                "package manager '{}' not recognized in {}",
                value,
                manifest_path.display()
            ))
            .into());
        };

        debug!(manifest = %manifest_path.display(), manager = &caps[1], "found package manager");
        return Ok(Some(caps[1].to_string()));
    }

    Ok(None)
}
