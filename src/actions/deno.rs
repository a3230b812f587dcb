//! `deno`: run a TypeScript script with `deno run`
//!
//! The script is inline source, written to a temporary `.ts` file for the
//! duration of the run, or a `file://`/`http(s)://` URI. Inline source is not
//! interpolated so that template literals reach deno untouched.

use crate::actions::run_shell;
use crate::error::{ConfigError, Result};
use crate::runner::{ActionContext, ActionHandler, ExecParams};
use crate::utils::resolve_path;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DenoOptions {
    script: Script,
    #[serde(default)]
    permissions: Permissions,
    #[serde(default)]
    reload: bool,
    #[serde(default)]
    unstable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Script {
    Source(String),
    Inline { inline: String },
    Uri { uri: String },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Permissions {
    All(bool),
    Granted(Grants),
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::All(false)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Grants {
    #[serde(default)]
    allow_env: bool,
    #[serde(default)]
    allow_read: bool,
    #[serde(default)]
    allow_write: bool,
    #[serde(default)]
    allow_sys: bool,
    #[serde(default)]
    allow_hr_time: bool,
    #[serde(default)]
    allow_net: bool,
    #[serde(default)]
    allow_ffi: bool,
    #[serde(default)]
    allow_run: bool,
}

impl Permissions {
    fn flags(&self) -> Vec<&'static str> {
        match self {
            Permissions::All(true) => vec!["--allow-all"],
            Permissions::All(false) => Vec::new(),
            Permissions::Granted(grants) => [
                (grants.allow_env, "--allow-env"),
                (grants.allow_read, "--allow-read"),
                (grants.allow_write, "--allow-write"),
                (grants.allow_sys, "--allow-sys"),
                (grants.allow_hr_time, "--allow-hrtime"),
                (grants.allow_net, "--allow-net"),
                (grants.allow_ffi, "--allow-ffi"),
                (grants.allow_run, "--allow-run"),
            ]
            .into_iter()
            .filter(|(granted, _)| *granted)
            .map(|(_, flag)| flag)
            .collect(),
        }
    }
}

impl DenoOptions {
    fn command(&self, target: &str) -> String {
        let mut parts = vec!["deno", "run"];
        parts.extend(self.permissions.flags());
        if self.unstable {
            parts.push("--unstable");
        }
        if self.reload {
            parts.push("-r");
        }
        parts.push(target);
        parts.join(" ")
    }
}

/// Script location deno is pointed at for a URI
fn resolve_uri(uri: &str, base: &Path) -> Result<String> {
    match uri.split_once("://") {
        Some(("http" | "https", _)) => Ok(uri.to_string()),
        Some(("file", path)) => Ok(resolve_path(base, path).display().to_string()),
        _ => Err(ConfigError::UnsupportedUri(uri.to_string()).into()),
    }
}

/// Runs a deno script in the Config directory
#[derive(Debug, Clone, Copy, Default)]
pub struct DenoAction;

#[async_trait]
impl ActionHandler for DenoAction {
    async fn execute(&self, ctx: &ActionContext<'_>, params: &ExecParams) -> Result<()> {
        let options: DenoOptions = ctx.action.parse_options()?;

        let source = match &options.script {
            Script::Source(source) | Script::Inline { inline: source } => source,
            Script::Uri { uri } => {
                let target = resolve_uri(uri, ctx.cwd())?;
                return run_shell(ctx, params, &options.command(&target), HashMap::new(), false)
                    .await;
            }
        };

        // Removed when dropped, after the run
        let file = tempfile::Builder::new()
            .prefix("cohesion-")
            .suffix(".ts")
            .tempfile()?;
        tokio::fs::write(file.path(), source).await?;
        debug!(path = %file.path().display(), "wrote inline deno script");

        let target = file.path().display().to_string();
        run_shell(ctx, params, &options.command(&target), HashMap::new(), false).await
    }
}
