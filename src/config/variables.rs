//! Variable cascade
//!
//! Scopes are overlaid from lowest to highest precedence. A `null` value
//! (`None`) at a scope hides every lower scope's value for that name, and a
//! lookup of a hidden name behaves exactly like a lookup of a name that was
//! never declared.

use crate::config::model::{Config, TaskId};
use crate::error::{ConfigError, ConfigResult};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;
use tracing::debug;

/// Effective variable mapping of one scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables(BTreeMap<String, Option<String>>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear a single name at the highest precedence
    pub fn set(&mut self, name: impl Into<String>, value: Option<String>) {
        self.0.insert(name.into(), value);
    }

    /// Overlay a higher-precedence scope onto this one
    pub fn overlay<I, K>(&mut self, scope: I)
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        for (name, value) in scope {
            self.0.insert(name.into(), value);
        }
    }

    /// Look up a name; unset and undeclared names both yield `None`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_deref())
    }

    /// Every name that currently holds a value
    pub fn defined(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }

    /// Flatten into a plain mapping of the defined names
    pub fn to_map(&self) -> HashMap<String, String> {
        self.defined()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        let mut variables = Variables::new();
        variables.overlay(iter);
        variables
    }
}

impl Config {
    /// Resolve the variables visible at Config level:
    /// `variables` < `variableFiles` (in order) < `pathVariables`
    pub async fn resolve_variables(&self) -> ConfigResult<Variables> {
        let mut resolved = Variables::new();
        resolved.overlay(self.variables.clone());

        for file in &self.variable_files {
            let path = self.resolve(&file.path);
            let entries = read_variable_file(&path).await?;
            let prefix = file.prefix.as_deref().unwrap_or("");
            resolved.overlay(
                entries
                    .into_iter()
                    .map(|(k, v)| (format!("{}{}", prefix, k), Some(v))),
            );
        }

        resolved.overlay(self.absolute_paths(&self.path_variables));
        Ok(resolved)
    }

    /// Resolve the variables visible at a task: the Config's variables, then each
    /// ancestor task outermost first, then the task itself. Within a task,
    /// `pathVariables` sit below `variables`.
    pub async fn resolve_task_variables(&self, id: TaskId) -> ConfigResult<Variables> {
        let mut resolved = self.resolve_variables().await?;

        let mut chain = self.task_ancestors(id);
        chain.push(id);
        for task_id in chain {
            let task = self.task(task_id);
            resolved.overlay(self.absolute_paths(&task.path_variables));
            resolved.overlay(task.variables.clone());
        }

        Ok(resolved)
    }

    fn absolute_paths(&self, paths: &BTreeMap<String, String>) -> Vec<(String, Option<String>)> {
        paths
            .iter()
            .map(|(name, path)| {
                let absolute = self.resolve(path).to_string_lossy().into_owned();
                (name.clone(), Some(absolute))
            })
            .collect()
    }
}

/// Read a dotenv-style file; a missing file contributes nothing
async fn read_variable_file(path: &Path) -> ConfigResult<Vec<(String, String)>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "variable file not found, skipping");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(ConfigError::VariableFile {
                path: path.to_path_buf(),
                error: e.to_string(),
            })
        }
    };

    dotenvy::from_read_iter(content.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::VariableFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{ConfigSource, Scope};
    use crate::config::types::ConfigDocument;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn register(dir: &Path, yaml: &str) -> Arc<Config> {
        let document: ConfigDocument = serde_yaml::from_str(yaml).unwrap();
        document.register(dir, ConfigSource::Inline, None)
    }

    #[test]
    fn test_overlay_precedence_and_unset() {
        let mut vars: Variables = vec![("a", Some("1".to_string())), ("b", Some("2".to_string()))]
            .into_iter()
            .collect();

        vars.overlay(vec![("a", Some("10".to_string())), ("b", None)]);

        assert_eq!(vars.get("a"), Some("10"));
        // Cleared at the higher scope: behaves like never declared
        assert_eq!(vars.get("b"), None);
        assert_eq!(vars.get("b"), vars.get("never"));
        assert!(!vars.to_map().contains_key("b"));

        // Omitting a name at the higher scope lets the lower value through
        let mut lower: Variables = vec![("c", Some("3".to_string()))].into_iter().collect();
        lower.overlay(Vec::<(String, Option<String>)>::new());
        assert_eq!(lower.get("c"), Some("3"));
    }

    #[tokio::test]
    async fn test_config_cascade_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env"), "A=from-file\nB=from-file\n").unwrap();
        fs::write(dir.path().join(".env.local"), "B=from-local\n").unwrap();

        let config = register(
            dir.path(),
            r#"
variables:
  A: from-config
  C: from-config
  OUT: plain
variableFiles:
  - .env
  - path: .env.local
  - path: .env.local
    prefix: LOCAL_
pathVariables:
  OUT: dist
"#,
        );

        let vars = config.resolve_variables().await.unwrap();
        assert_eq!(vars.get("A"), Some("from-file"));
        assert_eq!(vars.get("B"), Some("from-local"));
        assert_eq!(vars.get("C"), Some("from-config"));
        assert_eq!(vars.get("LOCAL_B"), Some("from-local"));
        let dist = dir.path().join("dist").to_string_lossy().into_owned();
        assert_eq!(vars.get("OUT"), Some(dist.as_str()));
    }

    #[tokio::test]
    async fn test_missing_variable_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = register(
            dir.path(),
            r#"
variables:
  A: "1"
variableFiles:
  - does-not-exist.env
"#,
        );

        let vars = config.resolve_variables().await.unwrap();
        assert_eq!(vars.get("A"), Some("1"));
    }

    #[tokio::test]
    async fn test_task_cascade() {
        let dir = TempDir::new().unwrap();
        let config = register(
            dir.path(),
            r#"
variables:
  level: config
  keep: config
  drop: config
tasks:
  - name: outer
    variables:
      level: outer
      drop: ~
    tasks:
      - name: inner
        pathVariables:
          level: ignored-by-variables
        variables:
          level: inner
"#,
        );

        let outer = config.find_task(Scope::Config, "outer").unwrap();
        let inner = config.find_task(Scope::Task(outer), "inner").unwrap();

        let outer_vars = config.resolve_task_variables(outer).await.unwrap();
        assert_eq!(outer_vars.get("level"), Some("outer"));
        assert_eq!(outer_vars.get("drop"), None);

        let inner_vars = config.resolve_task_variables(inner).await.unwrap();
        assert_eq!(inner_vars.get("level"), Some("inner"));
        assert_eq!(inner_vars.get("keep"), Some("config"));
        assert_eq!(inner_vars.get("drop"), None);
    }
}
