// src/cli.rs

//! Command-line arguments of the `adapter-launcher` binary.

use crate::constants::DEFAULT_TIMEOUT_MS;
use clap::Parser;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// adapter-launcher: starts a debugger as a TCP debug adapter.
///
/// The debugger (`lldb` unless the settings say otherwise) is started in batch
/// mode, imports the `adapter` module from the extension directory and opens a
/// debug adapter protocol server. Once it announces its port the endpoint is
/// printed and the launcher stays in the foreground until the adapter exits
/// or Ctrl+C is pressed.
///
/// Settings are read from `settings.toml` in the user's config directory
/// (e.g. `~/.config/adapter-launcher/settings.toml`) unless `--config` is given.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file to use instead of the default one.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// Directory that contains the `adapter` script module.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub extension_path: String,

    /// Working directory for the debugger. Defaults to the current directory.
    #[arg(short, long, value_name = "DIR")]
    pub workspace: Option<String>,

    /// Session parameters as a JSON object.
    #[arg(short, long, value_name = "JSON", default_value = "{}")]
    pub params: String,

    /// How long to wait for the port announcement, in milliseconds. 0 waits forever.
    #[arg(short, long, value_name = "MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,
}

/// Errors in command-line values that clap cannot check on its own.
#[derive(Error, Debug)]
pub enum CliError {
    /// `--params` is not valid JSON.
    #[error("--params is not valid JSON: {0}")]
    ParamsJson(#[from] serde_json::Error),
    /// `--params` is valid JSON but not an object.
    #[error("--params must be a JSON object, found: {0}")]
    ParamsNotObject(String),
}

impl Cli {
    /// The handshake timeout; `None` when disabled with `0`.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// `--params` parsed into a JSON object.
    pub fn params_object(&self) -> Result<Map<String, Value>, CliError> {
        match serde_json::from_str::<Value>(&self.params)? {
            Value::Object(map) => Ok(map),
            other => Err(CliError::ParamsNotObject(other.to_string())),
        }
    }
}
