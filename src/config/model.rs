//! Registered configuration tree
//!
//! A [`ConfigDocument`] becomes a [`Config`] through [`ConfigDocument::register`].
//! Tasks and actions live in flat arenas owned by their Config; parent links
//! are indices into those arenas, and the link to the discovering Config is a
//! [`Weak`] reference, so ownership stays a strict tree.

use crate::config::types::{
    ActionDocument, ActionOptions, ConfigDocument, ModuleReference, PluginReference,
    TaskDocument, VariableFileReference,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::error::{ConfigError, ConfigResult};

/// Reserved label identifying a discovered Config relative to its discoverer
pub const PATHSPEC_LABEL: &str = "cohesion:pathspec";

/// Index of a task inside its Config's task arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

/// Index of an action inside its Config's action arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(usize);

/// Where a Config was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Remote(String),
    /// Built in memory, e.g. by tests
    Inline,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Remote(uri) => write!(f, "{}", uri),
            ConfigSource::Inline => write!(f, "<inline>"),
        }
    }
}

/// A registered configuration unit
#[derive(Debug)]
pub struct Config {
    /// Resolution base for every relative reference in this Config
    pub path: PathBuf,
    pub source: ConfigSource,
    parent: Weak<Config>,
    pub modules: Vec<ModuleReference>,
    pub labels: BTreeMap<String, Vec<String>>,
    pub tags: Vec<String>,
    tasks: Vec<Task>,
    root_tasks: Vec<TaskId>,
    actions: Vec<Action>,
    root_actions: Vec<ActionId>,
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub variables: BTreeMap<String, Option<String>>,
    pub path_variables: BTreeMap<String, String>,
    pub variable_files: Vec<VariableFileReference>,
    pub plugins: Vec<PluginReference>,
}

/// A registered task
#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub parallel: bool,
    parent: Option<TaskId>,
    pub tasks: Vec<TaskId>,
    pub actions: Vec<ActionId>,
    pub variables: BTreeMap<String, Option<String>>,
    pub path_variables: BTreeMap<String, String>,
}

/// A registered action
#[derive(Debug, Clone)]
pub struct Action {
    pub kind: String,
    pub options: ActionOptions,
    owner: Option<TaskId>,
}

/// A node of the tree that can be executed: the Config itself or one of its tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Config,
    Task(TaskId),
}

impl ConfigDocument {
    /// Register this document as a Config rooted at `base_path`.
    ///
    /// The document is consumed, so a registered tree cannot be registered twice.
    pub fn register(
        self,
        base_path: impl Into<PathBuf>,
        source: ConfigSource,
        parent: Option<&Arc<Config>>,
    ) -> Arc<Config> {
        let mut builder = Builder::default();

        let root_actions = builder.actions(self.actions, None);
        let root_tasks = self
            .tasks
            .into_iter()
            .map(|task| builder.task(task, None))
            .collect();

        Arc::new(Config {
            path: base_path.into(),
            source,
            parent: parent.map(Arc::downgrade).unwrap_or_default(),
            modules: self.modules,
            labels: self.labels,
            tags: self.tags,
            tasks: builder.tasks,
            root_tasks,
            actions: builder.actions,
            root_actions,
            dependencies: self.dependencies,
            variables: self.variables,
            path_variables: self.path_variables,
            variable_files: self.variable_files,
            plugins: self.plugins,
        })
    }
}

#[derive(Default)]
struct Builder {
    tasks: Vec<Task>,
    actions: Vec<Action>,
}

impl Builder {
    fn task(&mut self, document: TaskDocument, parent: Option<TaskId>) -> TaskId {
        let id = TaskId(self.tasks.len());
        // Reserve the slot first so children see their parent's index
        self.tasks.push(Task {
            id,
            name: document.name,
            parallel: document.parallel,
            parent,
            tasks: Vec::new(),
            actions: Vec::new(),
            variables: document.variables,
            path_variables: document.path_variables,
        });

        let actions = self.actions(document.actions, Some(id));
        let tasks = document
            .tasks
            .into_iter()
            .map(|child| self.task(child, Some(id)))
            .collect();

        let task = &mut self.tasks[id.0];
        task.actions = actions;
        task.tasks = tasks;
        id
    }

    fn actions(&mut self, documents: Vec<ActionDocument>, owner: Option<TaskId>) -> Vec<ActionId> {
        documents
            .into_iter()
            .map(|document| {
                let id = ActionId(self.actions.len());
                self.actions.push(Action::from_document(document, owner));
                id
            })
            .collect()
    }
}

impl Config {
    /// The Config that discovered this one, if it is still alive
    pub fn parent(&self) -> Option<Arc<Config>> {
        self.parent.upgrade()
    }

    /// Number of discovering Configs above this one
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(config) = current {
            depth += 1;
            current = config.parent();
        }
        depth
    }

    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }

    pub fn action(&self, id: ActionId) -> &Action {
        &self.actions[id.0]
    }

    pub fn root_tasks(&self) -> &[TaskId] {
        &self.root_tasks
    }

    pub fn root_actions(&self) -> &[ActionId] {
        &self.root_actions
    }

    /// The task owning `id`, if it is not a top-level task
    pub fn task_parent(&self, id: TaskId) -> Option<TaskId> {
        self.task(id).parent
    }

    /// Ancestors of a task, outermost first, excluding the task itself
    pub fn task_ancestors(&self, id: TaskId) -> Vec<TaskId> {
        let mut chain = Vec::new();
        let mut current = self.task_parent(id);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.task_parent(parent);
        }
        chain.reverse();
        chain
    }

    /// Child tasks of a scope
    pub fn scope_tasks(&self, scope: Scope) -> &[TaskId] {
        match scope {
            Scope::Config => &self.root_tasks,
            Scope::Task(id) => &self.task(id).tasks,
        }
    }

    /// Direct actions of a scope
    pub fn scope_actions(&self, scope: Scope) -> &[ActionId] {
        match scope {
            Scope::Config => &self.root_actions,
            Scope::Task(id) => &self.task(id).actions,
        }
    }

    /// Whether a scope runs its children concurrently
    pub fn scope_parallel(&self, scope: Scope) -> bool {
        match scope {
            Scope::Config => false,
            Scope::Task(id) => self.task(id).parallel,
        }
    }

    /// Find a child task of `scope` by exact name
    pub fn find_task(&self, scope: Scope, name: &str) -> Option<TaskId> {
        self.scope_tasks(scope)
            .iter()
            .copied()
            .find(|id| self.task(*id).name == name)
    }

    /// Values of a label
    pub fn label(&self, key: &str) -> &[String] {
        self.labels.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The identity label, present on every discovered Config
    pub fn pathspec(&self) -> Option<&str> {
        self.label(PATHSPEC_LABEL).first().map(String::as_str)
    }

    /// Resolve a path relative to this Config
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        crate::utils::resolve_path(&self.path, path)
    }
}

impl Task {
    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }
}

impl Action {
    pub fn from_document(document: ActionDocument, owner: Option<TaskId>) -> Self {
        Action {
            kind: document.kind,
            options: document.options,
            owner,
        }
    }

    /// The task this action belongs to, `None` for Config-level actions
    pub fn owner(&self) -> Option<TaskId> {
        self.owner
    }

    /// Deserialize the option bag into the handler's typed options
    pub fn parse_options<T: DeserializeOwned>(&self) -> ConfigResult<T> {
        crate::config::types::parse_options(&self.options).map_err(|e| {
            ConfigError::InvalidActionOptions {
                action_type: self.kind.clone(),
                error: e.to_string(),
            }
        })
    }
}
