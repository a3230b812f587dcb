//! Configuration file discovery and loading

use crate::config::model::{Config, ConfigSource};
use crate::config::schema::parse_document;
use crate::config::types::ConfigDocument;
use crate::error::{ConfigError, ConfigResult, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Default configuration file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &["cohesion.yml", "cohesion.yaml"];

/// Find the configuration file by searching current and parent directories
pub fn find_config_file() -> ConfigResult<PathBuf> {
    find_config_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?)
}

/// Find the configuration file starting from a specific directory
pub fn find_config_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in CONFIG_FILE_NAMES {
            let config_path = current_dir.join(file_name);
            searched_paths.push(config_path.display().to_string());

            if config_path.is_file() {
                return Ok(config_path);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse and validate a configuration document from a string
pub fn parse_config(yaml: &str) -> ConfigResult<ConfigDocument> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    parse_document(value)
}

/// Read, parse and validate a configuration file.
///
/// A directory stands for the default config file inside it.
pub async fn read_config_file(path: &Path) -> ConfigResult<(PathBuf, ConfigDocument)> {
    let file = if tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        path.join(CONFIG_FILE_NAMES[0])
    } else {
        path.to_path_buf()
    };

    let contents = tokio::fs::read_to_string(&file)
        .await
        .map_err(|e| ConfigError::Load {
            uri: file.display().to_string(),
            error: e.to_string(),
        })?;

    let document = parse_config(&contents).map_err(|e| with_location(e, &file.display().to_string()))?;
    Ok((file, document))
}

/// Load and register a root Config from a path, `file://` URI or `http(s)://` URI.
///
/// Relative paths resolve against `cwd`; remote configs use `cwd` as their base path.
pub async fn load_config(location: &str, cwd: &Path) -> Result<Arc<Config>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        debug!(uri = location, "fetching remote config");
        let body = reqwest::get(location)
            .await?
            .error_for_status()?
            .text()
            .await?;

        let document = parse_config(&body).map_err(|e| with_location(e, location))?;
        return Ok(document.register(cwd, ConfigSource::Remote(location.to_string()), None));
    }

    let path = match location.strip_prefix("file://") {
        Some(path) => PathBuf::from(path),
        None if location.contains("://") => {
            return Err(ConfigError::UnsupportedUri(location.to_string()).into())
        }
        None => PathBuf::from(location),
    };

    let path = crate::utils::resolve_path(cwd, path);
    let (file, document) = read_config_file(&path).await?;
    debug!(path = %file.display(), "loaded config");

    let base = file.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());
    Ok(document.register(base, ConfigSource::File(file), None))
}

/// Attach the document location to parse failures
fn with_location(error: ConfigError, location: &str) -> ConfigError {
    match error {
        ConfigError::Invalid(message) => ConfigError::Load {
            uri: location.to_string(),
            error: message,
        },
        other => other,
    }
}
