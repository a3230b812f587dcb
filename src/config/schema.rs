//! Configuration validation
//!
//! Validation runs over the untyped YAML value before it is deserialized, so
//! that every violation in a document can be reported at once instead of
//! stopping at the first one.

use crate::config::types::ConfigDocument;
use crate::error::{ConfigError, ConfigResult, ValidationErrors};
use serde_yaml::{Mapping, Value};

const CONFIG_FIELDS: &[&str] = &[
    "modules",
    "labels",
    "tags",
    "tasks",
    "actions",
    "dependencies",
    "variables",
    "pathVariables",
    "variableFiles",
    "plugins",
];

const TASK_FIELDS: &[&str] = &[
    "name",
    "parallel",
    "tasks",
    "actions",
    "variables",
    "pathVariables",
];

/// Value shapes accepted by built-in action options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    String,
    Bool,
    /// One string or a list of strings
    Strings,
    StringMap,
    /// Pattern to list of patterns
    PatternLists,
    /// Label to one or more comma separated value groups
    Inclusion,
    Actions,
    Commands,
    DenoScript,
    DenoPermissions,
}

/// (field, shape, required)
type Field = (&'static str, Shape, bool);

const EXEC_COMMAND_FIELDS: &[Field] = &[
    ("cmd", Shape::String, false),
    ("platforms", Shape::Strings, false),
    ("env", Shape::StringMap, false),
];

const DENO_PERMISSIONS: &[&str] = &[
    "allowEnv",
    "allowRead",
    "allowWrite",
    "allowSys",
    "allowHrTime",
    "allowNet",
    "allowFfi",
    "allowRun",
];

/// Option tables for the built-in action types
const BUILTIN_ACTIONS: &[(&str, &[Field])] = &[
    (
        "exec",
        &[
            ("cmd", Shape::String, false),
            ("commands", Shape::Commands, false),
            ("platforms", Shape::Strings, false),
            ("env", Shape::StringMap, false),
            ("requiredVariables", Shape::Strings, false),
            ("ignoreExitCode", Shape::Bool, false),
        ],
    ),
    (
        "delegate.local",
        &[
            ("task", Shape::Strings, true),
            ("relative", Shape::Bool, false),
            ("parallel", Shape::Bool, false),
            ("variables", Shape::StringMap, false),
        ],
    ),
    (
        "delegate",
        &[
            ("task", Shape::Strings, false),
            ("dependencies", Shape::PatternLists, false),
            ("included", Shape::Inclusion, false),
            ("parallel", Shape::Bool, false),
            ("variables", Shape::StringMap, false),
        ],
    ),
    (
        "watch",
        &[
            ("actions", Shape::Actions, true),
            ("pattern", Shape::String, false),
            ("patterns", Shape::Strings, false),
            ("parallel", Shape::Bool, false),
        ],
    ),
    (
        "fs.copy",
        &[
            ("source", Shape::String, true),
            ("destination", Shape::String, true),
            ("sourceRoot", Shape::String, false),
        ],
    ),
    ("fs.empty", &[("path", Shape::String, true)]),
    (
        "deno",
        &[
            ("script", Shape::DenoScript, true),
            ("permissions", Shape::DenoPermissions, false),
            ("reload", Shape::Bool, false),
            ("unstable", Shape::Bool, false),
        ],
    ),
    (
        "node.script",
        &[
            ("script", Shape::String, true),
            ("exec", Shape::String, false),
            ("defaultExec", Shape::String, false),
        ],
    ),
];

/// Validate an untyped document and convert it into a [`ConfigDocument`]
pub fn parse_document(value: Value) -> ConfigResult<ConfigDocument> {
    validate_document(&value)?;

    serde_yaml::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))
}

/// Validate an untyped document, reporting every violation
pub fn validate_document(value: &Value) -> ConfigResult<()> {
    let mut errors = ValidationErrors::default();

    match value {
        // An empty file is an empty config
        Value::Null => {}
        Value::Mapping(map) => validate_config(map, &mut errors),
        _ => errors.push("", "config must be a mapping"),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors))
    }
}

fn validate_config(map: &Mapping, errors: &mut ValidationErrors) {
    check_fields(map, "", CONFIG_FIELDS, &[], errors);

    if let Some(modules) = map.get("modules") {
        match modules {
            Value::Sequence(seq) => {
                for (index, module) in seq.iter().enumerate() {
                    validate_module(module, &format!("modules[{}]", index), errors);
                }
            }
            single => validate_module(single, "modules", errors),
        }
    }

    if let Some(labels) = map.get("labels") {
        validate_labels(labels, "labels", errors);
    }

    if let Some(tags) = map.get("tags") {
        validate_string_list(tags, "tags", errors);
    }

    if let Some(tasks) = map.get("tasks") {
        validate_tasks(tasks, "tasks", errors);
    }

    if let Some(actions) = map.get("actions") {
        validate_actions(actions, "actions", errors);
    }

    if let Some(dependencies) = map.get("dependencies") {
        match dependencies {
            Value::Mapping(deps) => {
                for (key, value) in deps {
                    let path = format!("dependencies.{}", key_name(key));
                    if !key.is_string() {
                        errors.push(&path, "dependency pattern must be a string");
                    }
                    validate_string_list(value, &path, errors);
                }
            }
            _ => errors.push("dependencies", "expected a mapping of pattern to pattern list"),
        }
    }

    if let Some(variables) = map.get("variables") {
        validate_variables(variables, "variables", errors);
    }

    if let Some(path_variables) = map.get("pathVariables") {
        validate_string_map(path_variables, "pathVariables", errors);
    }

    if let Some(files) = map.get("variableFiles") {
        match files {
            Value::Sequence(seq) => {
                for (index, file) in seq.iter().enumerate() {
                    let path = format!("variableFiles[{}]", index);
                    match file {
                        Value::String(_) => {}
                        Value::Mapping(detail) => {
                            check_fields(detail, &path, &["path", "prefix"], &["path"], errors);
                            expect_string(detail, "path", &path, errors);
                            expect_string(detail, "prefix", &path, errors);
                        }
                        _ => errors.push(path, "expected a path or {path, prefix}"),
                    }
                }
            }
            _ => errors.push("variableFiles", "expected a list"),
        }
    }

    if let Some(plugins) = map.get("plugins") {
        match plugins {
            Value::Sequence(seq) => {
                for (index, plugin) in seq.iter().enumerate() {
                    let path = format!("plugins[{}]", index);
                    match plugin {
                        Value::Mapping(detail) => {
                            if !detail.contains_key("module") {
                                errors.push(&path, "missing required field 'module'");
                            }
                            expect_string(detail, "module", &path, errors);
                        }
                        _ => errors.push(path, "expected a mapping with a 'module' field"),
                    }
                }
            }
            _ => errors.push("plugins", "expected a list"),
        }
    }
}

fn validate_module(value: &Value, path: &str, errors: &mut ValidationErrors) {
    match value {
        Value::String(_) => {}
        Value::Mapping(map) => {
            check_fields(map, path, &["patterns", "labels"], &["patterns"], errors);
            if let Some(patterns) = map.get("patterns") {
                if !patterns.is_string() {
                    validate_string_list(patterns, &format!("{}.patterns", path), errors);
                }
            }
            if let Some(labels) = map.get("labels") {
                validate_string_map(labels, &format!("{}.labels", path), errors);
            }
        }
        _ => errors.push(path, "expected a pattern or {patterns, labels}"),
    }
}

fn validate_tasks(value: &Value, path: &str, errors: &mut ValidationErrors) {
    let Value::Sequence(tasks) = value else {
        errors.push(path, "expected a list of tasks");
        return;
    };

    let mut seen: Vec<&str> = Vec::new();
    for (index, task) in tasks.iter().enumerate() {
        let task_path = format!("{}[{}]", path, index);
        let Value::Mapping(map) = task else {
            errors.push(task_path, "expected a task mapping");
            continue;
        };

        check_fields(map, &task_path, TASK_FIELDS, &["name"], errors);
        expect_string(map, "name", &task_path, errors);

        if let Some(Value::String(name)) = map.get("name") {
            if seen.contains(&name.as_str()) {
                errors.push(
                    format!("{}.name", task_path),
                    format!("duplicate task name '{}' among siblings", name),
                );
            }
            seen.push(name);
        }

        if let Some(parallel) = map.get("parallel") {
            if !parallel.is_bool() {
                errors.push(format!("{}.parallel", task_path), "expected a boolean");
            }
        }
        if let Some(children) = map.get("tasks") {
            validate_tasks(children, &format!("{}.tasks", task_path), errors);
        }
        if let Some(actions) = map.get("actions") {
            validate_actions(actions, &format!("{}.actions", task_path), errors);
        }
        if let Some(variables) = map.get("variables") {
            validate_variables(variables, &format!("{}.variables", task_path), errors);
        }
        if let Some(path_variables) = map.get("pathVariables") {
            validate_string_map(path_variables, &format!("{}.pathVariables", task_path), errors);
        }
    }
}

fn validate_actions(value: &Value, path: &str, errors: &mut ValidationErrors) {
    let Value::Sequence(actions) = value else {
        errors.push(path, "expected a list of actions");
        return;
    };

    for (index, action) in actions.iter().enumerate() {
        validate_action(action, &format!("{}[{}]", path, index), errors);
    }
}

fn validate_action(value: &Value, path: &str, errors: &mut ValidationErrors) {
    let map = match value {
        Value::String(_) => return,
        Value::Mapping(map) => map,
        _ => {
            errors.push(path, "expected a command string or an action mapping");
            return;
        }
    };

    let kind = match map.get("type") {
        Some(Value::String(kind)) => kind.as_str(),
        Some(_) => {
            errors.push(format!("{}.type", path), "expected a string");
            return;
        }
        None => {
            errors.push(path, "missing required field 'type'");
            return;
        }
    };

    // Plugin-contributed types are validated by their handlers at run time
    let Some((_, fields)) = BUILTIN_ACTIONS.iter().find(|(name, _)| *name == kind) else {
        return;
    };

    let mut allowed = vec!["type"];
    allowed.extend(fields.iter().map(|(name, _, _)| *name));
    check_fields_with(map, path, &allowed, fields, errors);
}

/// Check unknown and missing fields, then the shape of every known field
fn check_fields_with(
    map: &Mapping,
    path: &str,
    allowed: &[&str],
    fields: &[Field],
    errors: &mut ValidationErrors,
) {
    let required: Vec<&str> = fields
        .iter()
        .filter(|(_, _, required)| *required)
        .map(|(name, _, _)| *name)
        .collect();
    check_fields(map, path, allowed, &required, errors);

    for (name, shape, _) in fields {
        if let Some(value) = map.get(*name) {
            validate_shape(value, *shape, &join(path, name), errors);
        }
    }
}

fn validate_shape(value: &Value, shape: Shape, path: &str, errors: &mut ValidationErrors) {
    match shape {
        Shape::String if !value.is_string() => errors.push(path, "expected a string"),
        Shape::Bool if !value.is_bool() => errors.push(path, "expected a boolean"),
        Shape::String | Shape::Bool => {}
        Shape::Strings => {
            if !value.is_string() {
                validate_string_list(value, path, errors);
            }
        }
        Shape::StringMap => validate_string_map(value, path, errors),
        Shape::PatternLists => match value {
            Value::Mapping(map) => {
                for (key, patterns) in map {
                    validate_string_list(patterns, &join(path, &key_name(key)), errors);
                }
            }
            _ => errors.push(path, "expected a mapping of pattern to pattern list"),
        },
        Shape::Inclusion => match value {
            Value::Mapping(map) => {
                for (key, groups) in map {
                    validate_shape(groups, Shape::Strings, &join(path, &key_name(key)), errors);
                }
            }
            _ => errors.push(path, "expected a mapping of label to value groups"),
        },
        Shape::Actions => validate_actions(value, path, errors),
        Shape::Commands => {
            let Value::Sequence(commands) = value else {
                errors.push(path, "expected a list of commands");
                return;
            };
            for (index, command) in commands.iter().enumerate() {
                let entry = format!("{}[{}]", path, index);
                match command {
                    Value::String(_) => {}
                    Value::Mapping(map) => {
                        let allowed: Vec<&str> =
                            EXEC_COMMAND_FIELDS.iter().map(|(name, _, _)| *name).collect();
                        check_fields_with(map, &entry, &allowed, EXEC_COMMAND_FIELDS, errors);
                    }
                    _ => errors.push(entry, "expected a command string or {cmd, platforms, env}"),
                }
            }
        }
        Shape::DenoScript => match value {
            Value::String(_) => {}
            Value::Mapping(map) if map.len() == 1 => {
                let key = map.keys().next().and_then(Value::as_str);
                match key {
                    Some(field @ ("inline" | "uri")) => {
                        expect_string(map, field, path, errors);
                    }
                    _ => errors.push(path, "expected {inline} or {uri}"),
                }
            }
            _ => errors.push(path, "expected a script, {inline} or {uri}"),
        },
        Shape::DenoPermissions => match value {
            Value::Bool(_) => {}
            Value::Mapping(map) => {
                check_fields(map, path, DENO_PERMISSIONS, &[], errors);
                for (key, grant) in map {
                    if !grant.is_bool() {
                        errors.push(join(path, &key_name(key)), "expected a boolean");
                    }
                }
            }
            _ => errors.push(path, "expected a boolean or a mapping of permissions"),
        },
    }
}

fn validate_labels(value: &Value, path: &str, errors: &mut ValidationErrors) {
    let Value::Mapping(map) = value else {
        errors.push(path, "expected a mapping");
        return;
    };

    for (key, value) in map {
        let entry = format!("{}.{}", path, key_name(key));
        match value {
            Value::Sequence(items) => {
                if !items.iter().all(is_scalar) {
                    errors.push(entry, "label values must be scalars");
                }
            }
            other if is_scalar(other) => {}
            _ => errors.push(entry, "expected a value or a list of values"),
        }
    }
}

fn validate_variables(value: &Value, path: &str, errors: &mut ValidationErrors) {
    let Value::Mapping(map) = value else {
        errors.push(path, "expected a mapping");
        return;
    };

    for (key, value) in map {
        if !(value.is_null() || is_scalar(value)) {
            errors.push(
                format!("{}.{}", path, key_name(key)),
                "expected a scalar or null",
            );
        }
    }
}

fn validate_string_map(value: &Value, path: &str, errors: &mut ValidationErrors) {
    let Value::Mapping(map) = value else {
        errors.push(path, "expected a mapping");
        return;
    };

    for (key, value) in map {
        if !value.is_string() {
            errors.push(format!("{}.{}", path, key_name(key)), "expected a string");
        }
    }
}

fn validate_string_list(value: &Value, path: &str, errors: &mut ValidationErrors) {
    match value {
        Value::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                if !item.is_string() {
                    errors.push(format!("{}[{}]", path, index), "expected a string");
                }
            }
        }
        _ => errors.push(path, "expected a list of strings"),
    }
}

/// Report unknown and missing fields of a mapping
fn check_fields(
    map: &Mapping,
    path: &str,
    allowed: &[&str],
    required: &[&str],
    errors: &mut ValidationErrors,
) {
    for key in map.keys() {
        match key.as_str() {
            Some(name) if allowed.contains(&name) => {}
            _ => errors.push(join(path, &key_name(key)), "unknown field"),
        }
    }

    for name in required {
        if !map.contains_key(*name) {
            errors.push(path, format!("missing required field '{}'", name));
        }
    }
}

fn expect_string(map: &Mapping, field: &str, path: &str, errors: &mut ValidationErrors) {
    if let Some(value) = map.get(field) {
        if !value.is_string() {
            errors.push(join(path, field), "expected a string");
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Bool(_) | Value::Number(_))
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "?".to_string()),
    }
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}
