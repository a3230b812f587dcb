//! File system actions: `fs.copy` and `fs.empty`

use crate::error::{ConfigError, Result};
use crate::runner::{interpolate, ActionContext, ActionHandler, ExecParams};
use crate::utils::relative_path;
use async_trait::async_trait;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CopyOptions {
    source: String,
    destination: String,
    source_root: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EmptyOptions {
    path: String,
}

/// Copies a file, a directory tree, or every match of a glob
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyAction;

#[async_trait]
impl ActionHandler for CopyAction {
    async fn execute(&self, ctx: &ActionContext<'_>, params: &ExecParams) -> Result<()> {
        let options: CopyOptions = ctx.action.parse_options()?;
        let vars = ctx.variables(params).await?;
        let label = params.label.as_deref();

        let raw_source = interpolate(&options.source, &vars)?;
        let source = ctx.config.resolve(&raw_source);
        let destination = ctx.config.resolve(interpolate(&options.destination, &vars)?);
        let source_root = match &options.source_root {
            Some(root) => ctx.config.resolve(interpolate(root, &vars)?),
            None => ctx.config.path.clone(),
        };

        if !is_glob(&raw_source) {
            let target = if destination.is_dir() && source.is_file() {
                match source.file_name() {
                    Some(name) => destination.join(name),
                    None => destination.clone(),
                }
            } else {
                destination.clone()
            };

            if !ctx.engine.is_dry_run() {
                copy_path(&source, &target).await?;
            }
            ctx.reporter().notice(
                label,
                &format!("Copied {} to {}", source.display(), target.display()),
            );
            return Ok(());
        }

        if destination.exists() && !destination.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid destination {}", destination.display()),
            )
            .into());
        }

        let pattern = if Path::new(&raw_source).is_absolute() {
            raw_source.clone()
        } else {
            format!(
                "{}/{}",
                glob::Pattern::escape(&ctx.config.path.to_string_lossy()),
                raw_source
            )
        };
        let mut matches: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: options.source.clone(),
                error: e.to_string(),
            })?
            .filter_map(|entry| entry.ok())
            .collect();
        matches.sort();

        for matched in matches {
            let target = destination.join(relative_path(&source_root, &matched));
            if !ctx.engine.is_dry_run() {
                copy_path(&matched, &target).await?;
            }
            ctx.reporter().notice(
                label,
                &format!("Copied {} to {}", matched.display(), target.display()),
            );
        }

        Ok(())
    }
}

/// Creates a directory, or removes everything inside an existing one
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyAction;

#[async_trait]
impl ActionHandler for EmptyAction {
    async fn execute(&self, ctx: &ActionContext<'_>, params: &ExecParams) -> Result<()> {
        let options: EmptyOptions = ctx.action.parse_options()?;
        let vars = ctx.variables(params).await?;
        let path = ctx.config.resolve(interpolate(&options.path, &vars)?);

        if !ctx.engine.is_dry_run() {
            empty_dir(&path).await?;
        }
        ctx.reporter()
            .notice(params.label.as_deref(), &format!("Emptied {}", path.display()));
        Ok(())
    }
}

fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// Copy a file or a whole directory tree, creating parents as needed
async fn copy_path(source: &Path, destination: &Path) -> io::Result<()> {
    let mut pending = vec![(source.to_path_buf(), destination.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        let metadata = fs::metadata(&from).await?;
        if metadata.is_dir() {
            fs::create_dir_all(&to).await?;
            let mut entries = fs::read_dir(&from).await?;
            while let Some(entry) = entries.next_entry().await? {
                pending.push((entry.path(), to.join(entry.file_name())));
            }
        } else {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::copy(&from, &to).await?;
        }
    }

    Ok(())
}

async fn empty_dir(path: &Path) -> io::Result<()> {
    if !fs::try_exists(path).await? {
        return fs::create_dir_all(path).await;
    }

    let mut entries = fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(entry.path()).await?;
        } else {
            fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}
