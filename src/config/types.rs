//! Configuration document types
//!
//! These structures mirror a `cohesion.yml` file as written. They carry no
//! paths and no parent links; [`ConfigDocument::register`](crate::config::ConfigDocument::register)
//! turns a document into a registered [`Config`](crate::config::Config).

use serde::de::{DeserializeOwned, Error as DeError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Option bag of an action: every key of the action mapping except `type`
pub type ActionOptions = BTreeMap<String, Value>;

/// Top-level configuration document
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigDocument {
    /// Module patterns discovering further configs
    #[serde(default, deserialize_with = "one_or_many")]
    pub modules: Vec<ModuleReference>,

    /// Multi-valued labels
    #[serde(default, deserialize_with = "deserialize_labels")]
    pub labels: BTreeMap<String, Vec<String>>,

    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Tasks defined at the top level
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskDocument>,

    /// Actions run when the config is executed without a selection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionDocument>,

    /// Dependency rules: identity pattern -> patterns it depends on
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, Vec<String>>,

    /// Variables; `null` clears a name at this scope
    #[serde(default, deserialize_with = "deserialize_variables")]
    pub variables: BTreeMap<String, Option<String>>,

    /// Variables holding paths relative to the config directory
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub path_variables: BTreeMap<String, String>,

    /// Dotenv-style files contributing variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_files: Vec<VariableFileReference>,

    /// Plugins contributing action types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginReference>,
}

/// A set of glob patterns plus labels applied to every config they discover
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleReference {
    pub patterns: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawModuleReference {
    Pattern(String),
    Detailed {
        #[serde(deserialize_with = "one_or_many")]
        patterns: Vec<String>,
        #[serde(default)]
        labels: BTreeMap<String, String>,
    },
}

impl<'de> Deserialize<'de> for ModuleReference {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawModuleReference::deserialize(deserializer)? {
            RawModuleReference::Pattern(pattern) => ModuleReference {
                patterns: vec![pattern],
                labels: BTreeMap::new(),
            },
            RawModuleReference::Detailed { patterns, labels } => {
                ModuleReference { patterns, labels }
            }
        })
    }
}

/// A task definition
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskDocument {
    /// Task name, unique among siblings
    pub name: String,

    /// Run children concurrently
    #[serde(default)]
    pub parallel: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskDocument>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionDocument>,

    #[serde(default, deserialize_with = "deserialize_variables")]
    pub variables: BTreeMap<String, Option<String>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub path_variables: BTreeMap<String, String>,
}

/// An action definition: a `type` discriminator plus its option bag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionDocument {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub options: ActionOptions,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAction {
    /// Bare string, shorthand for an `exec` action
    Shorthand(String),
    Full {
        #[serde(rename = "type")]
        kind: String,
        #[serde(flatten)]
        options: ActionOptions,
    },
}

impl<'de> Deserialize<'de> for ActionDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawAction::deserialize(deserializer)? {
            RawAction::Shorthand(cmd) => ActionDocument::shorthand(cmd),
            RawAction::Full { kind, options } => ActionDocument { kind, options },
        })
    }
}

impl ActionDocument {
    /// Build the `exec` action a bare command string stands for
    pub fn shorthand(cmd: impl Into<String>) -> Self {
        let mut options = ActionOptions::new();
        options.insert("cmd".to_string(), Value::String(cmd.into()));
        ActionDocument {
            kind: "exec".to_string(),
            options,
        }
    }

    /// Deserialize the option bag into a typed options struct
    pub fn parse_options<T: DeserializeOwned>(&self) -> Result<T, serde_yaml::Error> {
        parse_options(&self.options)
    }
}

/// Deserialize an option bag into a typed options struct
pub fn parse_options<T: DeserializeOwned>(options: &ActionOptions) -> Result<T, serde_yaml::Error> {
    let mapping: serde_yaml::Mapping = options
        .iter()
        .map(|(k, v)| (Value::String(k.clone()), v.clone()))
        .collect();
    serde_yaml::from_value(Value::Mapping(mapping))
}

/// A dotenv file contributing variables, optionally prefixing each key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableFileReference {
    pub path: String,
    pub prefix: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVariableFile {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        prefix: Option<String>,
    },
}

impl<'de> Deserialize<'de> for VariableFileReference {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawVariableFile::deserialize(deserializer)? {
            RawVariableFile::Path(path) => VariableFileReference { path, prefix: None },
            RawVariableFile::Detailed { path, prefix } => VariableFileReference { path, prefix },
        })
    }
}

/// A plugin to load: `module` names it, every other key is passed to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginReference {
    pub module: String,

    #[serde(flatten)]
    pub options: ActionOptions,
}

/// Accept either a single value or a sequence of values
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| T::deserialize(item).map_err(D::Error::custom))
            .collect(),
        single => Ok(vec![T::deserialize(single).map_err(D::Error::custom)?]),
    }
}

/// Labels map each key to one value or a list of values
fn deserialize_labels<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    let mut labels = BTreeMap::new();

    for (key, value) in raw {
        let values = match value {
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| scalar_to_string(&v).ok_or_else(|| D::Error::custom("label values must be scalars")))
                .collect::<Result<Vec<_>, _>>()?,
            other => vec![scalar_to_string(&other)
                .ok_or_else(|| D::Error::custom("label values must be scalars"))?],
        };

        let mut unique: Vec<String> = Vec::with_capacity(values.len());
        for v in values {
            if !unique.contains(&v) {
                unique.push(v);
            }
        }
        labels.insert(key, unique);
    }

    Ok(labels)
}

/// Variables accept any scalar; `null` is kept as an explicit unset
fn deserialize_variables<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();

    raw.into_iter()
        .map(|(key, value)| match value {
            Value::Null => Ok((key, None)),
            other => scalar_to_string(&other)
                .map(|s| (key.clone(), Some(s)))
                .ok_or_else(|| D::Error::custom(format!("variable '{}' must be a scalar or null", key))),
        })
        .collect()
}

/// Render a YAML scalar as a string
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_simple_config() {
        let yaml = r#"
tasks:
  - name: hello
    actions:
      - echo "hello"
"#;
        let config: ConfigDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.tasks[0].name, "hello");
        assert_eq!(config.tasks[0].actions[0].kind, "exec");
        assert_eq!(
            config.tasks[0].actions[0].options.get("cmd"),
            Some(&Value::String("echo \"hello\"".to_string()))
        );
    }

    #[test]
    fn test_deserialize_modules_forms() {
        let yaml = r#"
modules:
  - packages/*/cohesion.yml
  - patterns: apps/*/cohesion.yml
    labels:
      kind: app
"#;
        let config: ConfigDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.modules.len(), 2);
        assert_eq!(config.modules[0].patterns, vec!["packages/*/cohesion.yml"]);
        assert_eq!(config.modules[1].labels.get("kind").map(String::as_str), Some("app"));

        let single: ConfigDocument = serde_yaml::from_str("modules: libs/*/cohesion.yml").unwrap();
        assert_eq!(single.modules.len(), 1);
    }

    #[test]
    fn test_deserialize_labels_and_variables() {
        let yaml = r#"
labels:
  env: [prod, east, prod]
  team: core
variables:
  port: 8080
  debug: true
  cleared: ~
"#;
        let config: ConfigDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.labels["env"], vec!["prod", "east"]);
        assert_eq!(config.labels["team"], vec!["core"]);
        assert_eq!(config.variables["port"], Some("8080".to_string()));
        assert_eq!(config.variables["debug"], Some("true".to_string()));
        assert_eq!(config.variables["cleared"], None);
    }

    #[test]
    fn test_deserialize_full_action_keeps_options() {
        let yaml = r#"
actions:
  - type: delegate
    task: build
    parallel: true
"#;
        let config: ConfigDocument = serde_yaml::from_str(yaml).unwrap();
        let action = &config.actions[0];
        assert_eq!(action.kind, "delegate");
        assert_eq!(action.options.len(), 2);
        assert!(!action.options.contains_key("type"));
    }

    #[test]
    fn test_variable_file_forms() {
        let yaml = r#"
variableFiles:
  - .env
  - path: .env.local
    prefix: LOCAL_
"#;
        let config: ConfigDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.variable_files[0].prefix, None);
        assert_eq!(config.variable_files[1].prefix.as_deref(), Some("LOCAL_"));
    }

    #[test]
    fn test_parse_options() {
        #[derive(Deserialize)]
        struct Opts {
            cmd: String,
        }

        let action = ActionDocument::shorthand("make all");
        let opts: Opts = action.parse_options().unwrap();
        assert_eq!(opts.cmd, "make all");
    }
}
