//! Error types for Cohesion

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Cohesion operations
pub type Result<T> = std::result::Result<T, CohesionError>;

/// Main error type for Cohesion
#[derive(Error, Debug)]
pub enum CohesionError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Action registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Task execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Variable interpolation errors
    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Remote configuration fetch errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration failed validation:\n{0}")]
    Validation(ValidationErrors),

    #[error("Failed to load config '{uri}': {error}")]
    Load { uri: String, error: String },

    #[error("Unsupported config URI '{0}'")]
    UnsupportedUri(String),

    #[error("Invalid options for action '{action_type}': {error}")]
    InvalidActionOptions { action_type: String, error: String },

    #[error("Invalid glob pattern '{pattern}': {error}")]
    InvalidPattern { pattern: String, error: String },

    #[error("Failed to scan '{path}': {error}")]
    Scan { path: PathBuf, error: String },

    #[error("Plugin '{0}' is not available")]
    PluginNotFound(String),

    #[error("Failed to read variable file '{path}': {error}")]
    VariableFile { path: PathBuf, error: String },
}

/// Action registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Action type '{0}' is already registered")]
    DuplicateActionRegistration(String),

    #[error("Action type '{0}' is not defined")]
    UnknownActionType(String),
}

/// Task execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command '{command}' failed with exit code {code:?}")]
    CommandFailed { command: String, code: Option<i32> },

    #[error("Failed to spawn '{command}': {error}")]
    Spawn { command: String, error: String },

    #[error("Required variable '{0}' is not defined")]
    MissingRequiredVariable(String),

    #[error("Dependency cycle detected between: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("No delegated task defined")]
    NoDelegatedTask,

    #[error("{} concurrent units failed: {}", .0.len(), join_errors(.0))]
    Concurrent(Vec<CohesionError>),
}

/// Variable interpolation errors
#[derive(Error, Debug)]
pub enum InterpolationError {
    #[error("Variable '{0}' is not defined")]
    UndefinedVariable(String),

    #[error("Invalid interpolation syntax: {0}")]
    InvalidSyntax(String),
}

/// A single schema violation found while validating a configuration document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Location inside the document, e.g. `tasks[0].name`
    pub path: String,
    /// What is wrong at that location
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Every violation found in a configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<Violation>);

impl ValidationErrors {
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(Violation {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, violation) in self.0.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {}", violation)?;
        }
        Ok(())
    }
}

fn join_errors(errors: &[CohesionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for interpolation operations
pub type InterpolationResult<T> = std::result::Result<T, InterpolationError>;

/// Collapse the failures of a settled concurrent group into one result.
///
/// A single failure is surfaced as-is; several are wrapped in
/// [`ExecutionError::Concurrent`].
pub fn settle(results: Vec<Result<()>>) -> Result<()> {
    let mut failures: Vec<CohesionError> = results.into_iter().filter_map(|r| r.err()).collect();

    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => Err(ExecutionError::Concurrent(failures).into()),
    }
}

impl CohesionError {
    /// Whether this error (or any aggregated failure inside it) matches the predicate
    pub fn any(&self, predicate: &dyn Fn(&CohesionError) -> bool) -> bool {
        if predicate(self) {
            return true;
        }
        match self {
            CohesionError::Execution(ExecutionError::Concurrent(errors)) => {
                errors.iter().any(|e| e.any(predicate))
            }
            _ => false,
        }
    }
}
