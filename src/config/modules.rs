//! Module discovery
//!
//! Expands a Config's module patterns into the Configs they discover. The
//! walk is depth-first and lazy: each Config is yielded as soon as it is
//! loaded, before the Configs it discovers in turn.

use crate::config::model::{Config, ConfigSource, PATHSPEC_LABEL};
use crate::config::parse::{read_config_file, CONFIG_FILE_NAMES};
use crate::config::types::ModuleReference;
use crate::error::{ConfigError, ConfigResult};
use crate::utils::{normalize_path, relative_path, to_slash};
use futures::stream::{self, Stream, TryStreamExt};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task;
use tracing::{debug, trace};

/// A config file matched by a module reference, with the labels it pushes down
#[derive(Debug, Clone, PartialEq, Eq)]
struct ModuleMatch {
    file: PathBuf,
    labels: BTreeMap<String, String>,
}

struct Frame {
    parent: Arc<Config>,
    pending: VecDeque<ModuleMatch>,
}

struct Walk {
    stack: Vec<Frame>,
    visited: HashSet<PathBuf>,
}

impl Config {
    /// Lazily discover every Config reachable through this Config's modules
    pub fn resolve_configs(self: &Arc<Self>) -> impl Stream<Item = ConfigResult<Arc<Config>>> + Send {
        resolve_configs(self)
    }
}

/// Lazily discover every Config reachable from `root`, depth-first.
///
/// A file is yielded at most once per expansion, and never when it is `root`
/// itself, so cyclic module patterns terminate.
pub fn resolve_configs(root: &Arc<Config>) -> impl Stream<Item = ConfigResult<Arc<Config>>> + Send {
    let mut visited = HashSet::new();
    if let ConfigSource::File(file) = &root.source {
        visited.insert(canonical(file));
    }

    let root = root.clone();
    stream::once(async move {
        let pending = expand_modules(&root).await?;
        Ok::<_, ConfigError>(Walk {
            stack: vec![Frame {
                parent: root,
                pending,
            }],
            visited,
        })
    })
    .map_ok(|walk| stream::try_unfold(walk, next_module))
    .try_flatten()
}

/// Advance the walk to the next unvisited module and load it
async fn next_module(mut walk: Walk) -> ConfigResult<Option<(Arc<Config>, Walk)>> {
    loop {
        let Some(frame) = walk.stack.last_mut() else {
            return Ok(None);
        };
        let Some(module) = frame.pending.pop_front() else {
            walk.stack.pop();
            continue;
        };
        if !walk.visited.insert(canonical(&module.file)) {
            trace!(path = %module.file.display(), "module already visited");
            continue;
        }

        let parent = frame.parent.clone();
        let child = load_module(&module, &parent).await?;
        let pending = expand_modules(&child).await?;
        walk.stack.push(Frame {
            parent: child.clone(),
            pending,
        });
        return Ok(Some((child, walk)));
    }
}

/// Collect every Config reachable from `root`, in discovery order
pub async fn collect_configs(root: &Arc<Config>) -> ConfigResult<Vec<Arc<Config>>> {
    resolve_configs(root).try_collect().await
}

/// Glob every module reference of `config` into config files, off the
/// async runtime.
///
/// Matches of one pattern are sorted; a file matched by several references
/// keeps the labels of the first one.
async fn expand_modules(config: &Config) -> ConfigResult<VecDeque<ModuleMatch>> {
    if config.modules.is_empty() {
        return Ok(VecDeque::new());
    }
    let base = config.path.clone();
    let references = config.modules.clone();

    task::spawn_blocking(move || match_modules(&base, &references))
        .await
        .map_err(|e| ConfigError::Scan {
            path: config.path.clone(),
            error: e.to_string(),
        })?
}

fn match_modules(base: &Path, references: &[ModuleReference]) -> ConfigResult<VecDeque<ModuleMatch>> {
    let mut matches: Vec<ModuleMatch> = Vec::new();
    let escaped = glob::Pattern::escape(&base.to_string_lossy());

    for reference in references {
        for pattern in &reference.patterns {
            let full = if Path::new(pattern).is_absolute() {
                pattern.clone()
            } else {
                format!("{}/{}", escaped.trim_end_matches('/'), pattern)
            };
            let paths = glob::glob(&full).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                error: e.to_string(),
            })?;

            let mut files: Vec<PathBuf> = paths
                .filter_map(|entry| entry.ok())
                .filter_map(|path| config_file_at(&normalize_path(&path)))
                .collect();
            files.sort();

            trace!(pattern = %pattern, count = files.len(), "expanded module pattern");

            for file in files {
                let key = canonical(&file);
                if matches.iter().any(|m| canonical(&m.file) == key) {
                    continue;
                }
                matches.push(ModuleMatch {
                    file,
                    labels: reference.labels.clone(),
                });
            }
        }
    }

    Ok(matches.into())
}

/// A matched path is a config file itself, or a directory holding one
fn config_file_at(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.is_dir() {
        return CONFIG_FILE_NAMES
            .iter()
            .map(|name| path.join(name))
            .find(|file| file.is_file());
    }
    None
}

async fn load_module(module: &ModuleMatch, parent: &Arc<Config>) -> ConfigResult<Arc<Config>> {
    let (file, mut document) = read_config_file(&module.file).await?;
    let dir = file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| parent.path.clone());

    // Own labels win, then the reference fills gaps, then identity is forced
    for (key, value) in &module.labels {
        document
            .labels
            .entry(key.clone())
            .or_insert_with(|| vec![value.clone()]);
    }
    let pathspec = pathspec(&parent.path, &dir);
    document
        .labels
        .insert(PATHSPEC_LABEL.to_string(), vec![pathspec.clone()]);

    debug!(pathspec = %pathspec, path = %file.display(), "discovered module");
    Ok(document.register(dir, ConfigSource::File(file), Some(parent)))
}

/// Identity of `dir` relative to the discovering Config's directory
pub fn pathspec(parent: &Path, dir: &Path) -> String {
    let relative = to_slash(&relative_path(parent, dir));
    if relative.is_empty() {
        ".".to_string()
    } else {
        relative
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize_path(path))
}
