//! `watch`: re-run nested actions when watched files change
//!
//! Files matching the patterns are polled for their modification time. Once
//! a change is seen, the action waits until the matches stay unchanged for
//! the debounce interval, then runs its nested actions. The action only
//! returns on a configuration error; failures of a triggered run are
//! reported and watching continues.

use crate::config::types::one_or_many;
use crate::config::{Action, ActionDocument};
use crate::error::{settle, ConfigError, ConfigResult, Result};
use crate::runner::{ActionContext, ActionHandler, ExecParams};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task;
use tokio::time::sleep;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEBOUNCE: Duration = Duration::from_millis(500);

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WatchOptions {
    pattern: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    patterns: Vec<String>,
    actions: Vec<ActionDocument>,
    #[serde(default = "default_parallel")]
    parallel: bool,
}

impl WatchOptions {
    fn all_patterns(&self) -> Vec<String> {
        self.pattern
            .iter()
            .chain(self.patterns.iter())
            .cloned()
            .collect()
    }
}

/// Modification time of every watched file; `None` when it vanished
type Snapshot = BTreeMap<PathBuf, Option<SystemTime>>;

/// Watches files and re-runs nested actions on change
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchAction;

#[async_trait]
impl ActionHandler for WatchAction {
    async fn execute(&self, ctx: &ActionContext<'_>, params: &ExecParams) -> Result<()> {
        let options: WatchOptions = ctx.action.parse_options()?;
        let patterns = options.all_patterns();
        let actions: Vec<Action> = options
            .actions
            .iter()
            .cloned()
            .map(|document| Action::from_document(document, ctx.action.owner()))
            .collect();

        let label = params.label.as_deref();
        let reporter = ctx.reporter();

        let mut known = snapshot(&ctx.config.path, &patterns).await?;
        reporter.notice(label, &format!("Watching {} files", known.len()));

        loop {
            sleep(POLL_INTERVAL).await;
            let mut current = snapshot(&ctx.config.path, &patterns).await?;
            if current == known {
                continue;
            }

            loop {
                sleep(DEBOUNCE).await;
                let next = snapshot(&ctx.config.path, &patterns).await?;
                if next == current {
                    break;
                }
                current = next;
            }

            debug!(files = current.len(), "watched files changed");
            known = current;
            reporter.notice(label, "Change detected");

            if let Err(error) = run_actions(ctx, &actions, options.parallel, params).await {
                reporter.error(label, &error.to_string());
            }
        }
    }
}

async fn run_actions(
    ctx: &ActionContext<'_>,
    actions: &[Action],
    parallel: bool,
    params: &ExecParams,
) -> Result<()> {
    let runs = actions
        .iter()
        .map(|action| ctx.engine.exec_action(ctx.config, action, params));

    if parallel {
        return settle(join_all(runs).await);
    }
    for run in runs {
        run.await?;
    }
    Ok(())
}

/// Take a snapshot off the async runtime; globbing and stat calls block
async fn snapshot(base: &Path, patterns: &[String]) -> ConfigResult<Snapshot> {
    let dir = base.to_path_buf();
    let patterns = patterns.to_vec();

    task::spawn_blocking(move || scan(&dir, &patterns))
        .await
        .map_err(|e| ConfigError::Scan {
            path: base.to_path_buf(),
            error: e.to_string(),
        })?
}

fn scan(base: &Path, patterns: &[String]) -> ConfigResult<Snapshot> {
    let escaped = glob::Pattern::escape(&base.to_string_lossy());
    let mut files = Snapshot::new();

    for pattern in patterns {
        let full = if Path::new(pattern).is_absolute() {
            pattern.clone()
        } else {
            format!("{}/{}", escaped.trim_end_matches('/'), pattern)
        };
        let paths = glob::glob(&full).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            error: e.to_string(),
        })?;

        for path in paths.filter_map(|entry| entry.ok()) {
            let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
            files.insert(path, modified);
        }
    }

    Ok(files)
}
