// src/core/expander.rs

//! Expansion of `${tag:name}` placeholders.
//!
//! The expander knows nothing about where values come from; callers hand in a
//! resolver that decides what each tag means. Expansion is a single pass over
//! the template, so resolved values that happen to contain `${...}` are copied
//! verbatim instead of being expanded again.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    // `${name}` (no tag) and `${tag:name}`. An unterminated `${` never matches.
    static ref PLACEHOLDER_RE: Regex =
        Regex::new(r"\$\{(?:([^:}]+):)?([^}]+)\}").expect("placeholder regex is valid");
}

/// Errors raised while expanding a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    /// The resolver does not handle the placeholder's tag.
    #[error("Unknown variable type '{tag}' in placeholder '{placeholder}'.")]
    UnknownTag {
        /// The tag as written (empty for `${name}`).
        tag: String,
        /// The full placeholder text, e.g. `${unknown:X}`.
        placeholder: String,
    },
}

/// Replaces every `${tag:name}` placeholder in `template` with the value the
/// resolver returns for `(tag, name)`.
///
/// A placeholder written without a tag reaches the resolver with an empty tag.
/// The first resolver error aborts the expansion and is returned as is.
pub fn expand_variables<F>(template: &str, mut resolver: F) -> Result<String, ExpandError>
where
    F: FnMut(&str, &str) -> Result<String, ExpandError>,
{
    let mut expanded = String::with_capacity(template.len());
    let mut last_end = 0;

    for captures in PLACEHOLDER_RE.captures_iter(template) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let tag = captures.get(1).map_or("", |m| m.as_str());
        let name = captures.get(2).map_or("", |m| m.as_str());

        expanded.push_str(template.get(last_end..whole.start()).unwrap_or_default());
        expanded.push_str(&resolver(tag, name)?);
        last_end = whole.end();
    }

    expanded.push_str(template.get(last_end..).unwrap_or_default());
    Ok(expanded)
}

/// Builds the error a resolver returns for a tag it does not handle.
pub fn unknown_tag(tag: &str, name: &str) -> ExpandError {
    let placeholder = if tag.is_empty() {
        format!("${{{name}}}")
    } else {
        format!("${{{tag}:{name}}}")
    };
    ExpandError::UnknownTag {
        tag: tag.to_string(),
        placeholder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_only<'a>(vars: &'a HashMap<&'a str, &'a str>) -> impl FnMut(&str, &str) -> Result<String, ExpandError> + 'a {
        move |tag, name| {
            if tag == "env" {
                Ok(vars.get(name).map(|v| v.to_string()).unwrap_or_default())
            } else {
                Err(unknown_tag(tag, name))
            }
        }
    }

    #[test]
    fn test_template_without_placeholders_is_unchanged() {
        let vars = HashMap::new();
        for template in ["", "plain text", "$HOME and %PATH%", "${unterminated", "$ {env:X}"] {
            assert_eq!(expand_variables(template, env_only(&vars)).unwrap(), template);
        }
    }

    #[test]
    fn test_env_placeholder_is_resolved() {
        let vars = HashMap::from([("FOO", "bar")]);
        assert_eq!(expand_variables("${env:FOO}", env_only(&vars)).unwrap(), "bar");
    }

    #[test]
    fn test_multiple_placeholders_and_literals() {
        let vars = HashMap::from([("A", "1"), ("B", "2")]);
        let result = expand_variables("x=${env:A};y=${env:B};again=${env:A}", env_only(&vars));
        assert_eq!(result.unwrap(), "x=1;y=2;again=1");
    }

    #[test]
    fn test_unknown_tag_is_reported_with_placeholder() {
        let vars = HashMap::new();
        let err = expand_variables("before ${unknown:X} after", env_only(&vars)).unwrap_err();
        assert_eq!(
            err,
            ExpandError::UnknownTag {
                tag: "unknown".to_string(),
                placeholder: "${unknown:X}".to_string(),
            }
        );
        assert!(err.to_string().contains("${unknown:X}"));
    }

    #[test]
    fn test_untagged_placeholder_reaches_resolver_with_empty_tag() {
        let mut seen = Vec::new();
        let result = expand_variables("${workspaceFolder}", |tag, name| {
            seen.push((tag.to_string(), name.to_string()));
            Err(unknown_tag(tag, name))
        });
        assert_eq!(seen, vec![(String::new(), "workspaceFolder".to_string())]);
        assert!(matches!(result, Err(ExpandError::UnknownTag { placeholder, .. }) if placeholder == "${workspaceFolder}"));
    }

    #[test]
    fn test_resolved_values_are_not_expanded_again() {
        let vars = HashMap::from([("LOOP", "${env:LOOP}")]);
        assert_eq!(expand_variables("${env:LOOP}", env_only(&vars)).unwrap(), "${env:LOOP}");
    }
}
