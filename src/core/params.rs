// src/core/params.rs

//! The parameter blob handed to the adapter's session-start routine.

use crate::core::settings::ConfigSource;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map, Value};

/// Settings copied into the blob when, and only when, they are explicitly set.
pub const PASS_THROUGH_KEYS: &[&str] = &[
    "logLevel",
    "loggers",
    "logFile",
    "reverseDebugging",
    "suppressMissingSourceFiles",
    "evaluationTimeout",
    "ptvsd",
];

/// Folds the pass-through settings into `params`.
///
/// An unset key leaves `params` untouched, so the adapter can tell "not
/// configured" apart from `false`, `0` or `""`.
pub fn merge_pass_through(params: &mut Map<String, Value>, config: &dyn ConfigSource) {
    for &key in PASS_THROUGH_KEYS {
        if let Some(value) = config.get(key) {
            params.insert(key.to_string(), value);
        }
    }
}

/// Serializes `params` to JSON and encodes it with standard base64.
pub fn encode_params(params: &Map<String, Value>) -> String {
    // Serializing a map of `Value`s cannot fail.
    let json = Value::Object(params.clone()).to_string();
    STANDARD.encode(json)
}

/// Builds the complete blob: caller parameters plus configured pass-through keys.
pub fn adapter_parameters(mut params: Map<String, Value>, config: &dyn ConfigSource) -> String {
    merge_pass_through(&mut params, config);
    encode_params(&params)
}
