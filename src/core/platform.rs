// src/core/platform.rs

//! Platform-specific launch policy.
//!
//! Every "does this platform behave differently" decision lives here, keyed on
//! a platform identifier in the style of `win32` / `darwin` / `linux`.

use crate::{
    constants::{DARWIN_SYSTEM_BIN_DIR, PATH_VAR},
    core::environment::{EnvMap, EnvSnapshot},
};
use std::fmt;

/// A platform identifier plus the policy branches derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    id: String,
}

impl Platform {
    /// Wraps an arbitrary platform identifier (`win32`, `darwin`, `linux`, ...).
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The platform this binary runs on.
    ///
    /// Rust's OS names are mapped to the identifiers the adapter tooling uses:
    /// `windows` becomes `win32` and `macos` becomes `darwin`.
    pub fn current() -> Self {
        let id = match std::env::consts::OS {
            "windows" => "win32",
            "macos" => "darwin",
            other => other,
        };
        Self::new(id)
    }

    /// The raw identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether environment variable names compare case-insensitively.
    pub fn has_case_insensitive_env(&self) -> bool {
        self.id.contains("win32")
    }

    /// Whether the system binaries directory must go in front of `PATH`.
    ///
    /// Only the exact identifier `darwin` qualifies.
    pub fn prefers_system_binaries(&self) -> bool {
        self.id == "darwin"
    }

    /// Applies the launch-time environment overrides of this platform to `env`.
    ///
    /// On darwin `PATH` becomes `/usr/bin:` followed by the *base* snapshot's
    /// `PATH`, replacing whatever the composed environment held.
    pub fn apply_launch_policy(&self, env: &mut EnvMap, base: &EnvSnapshot) {
        if !self.prefers_system_binaries() {
            return;
        }
        // An empty entry would put the working directory on the search path.
        let path = match base.get(PATH_VAR).filter(|inherited| !inherited.is_empty()) {
            Some(inherited) => format!("{DARWIN_SYSTEM_BIN_DIR}:{inherited}"),
            None => DARWIN_SYSTEM_BIN_DIR.to_string(),
        };
        log::debug!("darwin policy: PATH set to '{}'", path);
        env.insert(PATH_VAR.to_string(), path);
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
