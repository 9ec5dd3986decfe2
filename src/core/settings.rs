// src/core/settings.rs

//! Key/value settings consumed by the session coordinator.
//!
//! Settings come from a TOML file, but callers only see them through the
//! [`ConfigSource`] trait so that any key/value store (or a plain JSON object
//! in tests) can stand in for the file.

use crate::constants::{APP_CONFIG_DIR, SETTINGS_FILENAME};
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Errors raised while locating or reading settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The platform has no per-user config directory.
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    /// The settings file could not be read.
    #[error("Could not read settings file '{path}': {source}")]
    Read {
        /// The file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid TOML.
    #[error("Failed to parse settings file '{path}': {source}")]
    TomlParse {
        /// The file that failed to parse.
        path: PathBuf,
        /// The underlying parsing error from the `toml` crate.
        #[source]
        source: toml::de::Error,
    },
    /// `~` or an environment variable in a path could not be expanded.
    #[error("Failed to expand path '{path}': {reason}")]
    PathExpansion {
        /// The path as given.
        path: String,
        /// Why expansion failed.
        reason: String,
    },
}

/// A read-only key/value configuration source.
pub trait ConfigSource: Send + Sync {
    /// Returns the value stored under `key`, or `None` when the key is not set.
    ///
    /// "Not set" and "set to a falsy value" must stay distinguishable.
    fn get(&self, key: &str) -> Option<Value>;

    /// Returns the value under `key`, or `default` when the key is not set.
    fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }
}

impl ConfigSource for Map<String, Value> {
    fn get(&self, key: &str) -> Option<Value> {
        Map::get(self, key).cloned()
    }
}

/// Settings loaded from a TOML file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: Map<String, Value>,
    source: Option<PathBuf>,
}

impl Settings {
    /// Parses settings from TOML text.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, SettingsError> {
        let table: toml::Table = toml::from_str(content).map_err(|e| SettingsError::TomlParse {
            path: origin.to_path_buf(),
            source: e,
        })?;
        let values = table
            .into_iter()
            .map(|(key, value)| (key, toml_to_json(value)))
            .collect();
        Ok(Self {
            values,
            source: Some(origin.to_path_buf()),
        })
    }

    /// Reads and parses a settings file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Loads settings from `explicit` if given (the file must exist), otherwise
    /// from the default location, where a missing file means empty settings.
    pub fn load_or_default(explicit: Option<&str>) -> Result<Self, SettingsError> {
        if let Some(raw) = explicit {
            let path = expand_user_path(raw)?;
            log::debug!("Loading settings from '{}'", path.display());
            return Self::load(&path);
        }

        let path = default_settings_path()?;
        if !path.exists() {
            log::debug!("No settings file at '{}', using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// The file these settings were read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

impl ConfigSource for Settings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }
}

/// `<config_dir>/adapter-launcher/settings.toml`.
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let dir = dirs::config_dir().ok_or(SettingsError::ConfigDirNotFound)?;
    Ok(dir.join(APP_CONFIG_DIR).join(SETTINGS_FILENAME))
}

/// Expands `~` and environment variables in a user-supplied path and strips
/// Windows verbatim prefixes.
pub fn expand_user_path(raw: &str) -> Result<PathBuf, SettingsError> {
    let expanded = shellexpand::full(raw).map_err(|e| SettingsError::PathExpansion {
        path: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(dunce::simplified(Path::new(expanded.as_ref())).to_path_buf())
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}
