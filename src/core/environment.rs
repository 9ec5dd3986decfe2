// src/core/environment.rs

//! Environment composition for the adapter process.
//!
//! The base environment is captured once into an [`EnvSnapshot`] and never
//! mutated afterwards. Each launch builds a fresh [`EnvMap`] from it.

use crate::core::{
    expander::{self, ExpandError},
    platform::Platform,
};
use std::{
    collections::HashMap,
    sync::Arc,
};

/// Variable name → value, as handed to the child process.
pub type EnvMap = HashMap<String, String>;

/// An immutable copy of a process environment, cheap to clone and share
/// between concurrent sessions.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: Arc<EnvMap>,
    // Lowercased name → name as it appears in `vars`.
    folded_names: Arc<HashMap<String, String>>,
}

impl EnvSnapshot {
    /// Captures the environment of the current process.
    ///
    /// Variables whose name or value is not valid Unicode are converted lossily.
    pub fn capture() -> Self {
        Self::from_map(
            std::env::vars_os()
                .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
                .collect(),
        )
    }

    /// Builds a snapshot from an existing map.
    pub fn from_map(vars: EnvMap) -> Self {
        let mut names: Vec<&String> = vars.keys().collect();
        names.sort();
        // When several names differ only in case the last one in sorted order wins.
        let folded_names = names
            .into_iter()
            .map(|name| (name.to_lowercase(), name.clone()))
            .collect();
        Self {
            vars: Arc::new(vars),
            folded_names: Arc::new(folded_names),
        }
    }

    /// Builds a snapshot from `(name, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::from_map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Returns the name under which `name` should be stored or looked up on
    /// `platform`: the existing spelling if the platform ignores case and one
    /// exists, otherwise `name` itself.
    pub fn reconcile_name<'a>(&'a self, name: &'a str, platform: &Platform) -> &'a str {
        if platform.has_case_insensitive_env() {
            if let Some(existing) = self.folded_names.get(&name.to_lowercase()) {
                return existing;
            }
        }
        name
    }

    /// Lookup honouring the platform's case rules.
    pub fn lookup(&self, name: &str, platform: &Platform) -> Option<&str> {
        self.get(self.reconcile_name(name, platform))
    }

    /// A fresh, owned copy of the variables.
    pub fn to_map(&self) -> EnvMap {
        self.vars.as_ref().clone()
    }

    /// Number of variables in the snapshot.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the snapshot holds no variables.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Resolver used for override values: only `${env:NAME}` is understood, and it
/// always reads from the base snapshot. Unset names expand to an empty string.
pub fn env_resolver<'a>(
    base: &'a EnvSnapshot,
    platform: &'a Platform,
) -> impl FnMut(&str, &str) -> Result<String, ExpandError> + 'a {
    move |tag, name| {
        if tag == "env" {
            Ok(base.lookup(name, platform).unwrap_or_default().to_string())
        } else {
            Err(expander::unknown_tag(tag, name))
        }
    }
}

/// Composes the child environment from `base` and `overrides`.
///
/// Every override value is expanded against the base snapshot before it is
/// stored, so overrides can reference the previous value of any variable
/// (their own included) but never each other's new values. On platforms with
/// case-insensitive names an override replaces the existing variable under its
/// original spelling.
pub fn compose_environment(
    base: &EnvSnapshot,
    overrides: &EnvMap,
    platform: &Platform,
) -> Result<EnvMap, ExpandError> {
    let mut env = base.to_map();

    // Sorted so keys that collide case-insensitively resolve deterministically.
    let mut ordered: Vec<(&String, &String)> = overrides.iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(b.0));

    for (key, template) in ordered {
        let target = base.reconcile_name(key, platform).to_string();
        let value = expander::expand_variables(template, env_resolver(base, platform))?;
        log::debug!("Environment override: {}={}", target, value);
        env.insert(target, value);
    }

    Ok(env)
}
