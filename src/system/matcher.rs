// src/system/matcher.rs

//! Waiting for a pattern to show up in a process's standard output.
//!
//! Output is accumulated in full and re-tested after every chunk, so a match
//! that straddles two reads is still found. Patterns are meant to be compiled
//! with [`compile_pattern`], which enables multi-line mode: `^` and `$` then
//! anchor at line boundaries anywhere in the buffer.

use crate::system::launcher::{ExitInfo, OutputReceiver, ProcessHandle};
use regex::bytes::{Captures, Regex, RegexBuilder};
use std::time::Duration;
use thiserror::Error;

/// How long to wait for the exit status after stdout closed, for diagnostics.
const EXIT_GRACE: Duration = Duration::from_millis(250);

/// Errors raised while waiting for a pattern.
#[derive(Error, Debug)]
pub enum MatchError {
    /// The bound elapsed before the pattern appeared.
    #[error("Timed out after {}ms waiting for the adapter. Output so far:\n{output}", .after.as_millis())]
    Timeout {
        /// The bound that elapsed.
        after: Duration,
        /// Everything read before giving up.
        output: String,
    },
    /// The stream ended before the pattern appeared.
    #[error("Adapter output ended without the expected announcement ({}). Output:\n{output}", describe_exit(.exit))]
    NoMatch {
        /// Everything the stream produced.
        output: String,
        /// How the process ended, when known.
        exit: Option<ExitInfo>,
    },
}

fn describe_exit(exit: &Option<ExitInfo>) -> String {
    exit.map_or_else(|| "process still running".to_string(), |info| info.to_string())
}

/// Captured groups of the first match. Group 0 is the whole match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    groups: Vec<Option<String>>,
}

impl PatternMatch {
    fn from_captures(captures: &Captures<'_>) -> Self {
        let groups = captures
            .iter()
            .map(|group| group.map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned()))
            .collect();
        Self { groups }
    }

    /// Group `index`, if it exists and participated in the match.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// The whole matched text.
    pub fn whole(&self) -> &str {
        self.get(0).unwrap_or_default()
    }

    /// Number of groups, including group 0.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups at all.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Compiles `pattern` in multi-line mode.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).multi_line(true).build()
}

/// Reads chunks from `output` until `regex` matches the accumulated text.
///
/// Once matched no further chunk is read and the receiver is closed. A `None`
/// timeout waits as long as the stream stays open.
///
/// # Errors
/// [`MatchError::NoMatch`] if the stream ends first (its `exit` is left
/// empty), [`MatchError::Timeout`] if the bound elapses first.
pub async fn scan_output(
    output: &mut OutputReceiver,
    regex: &Regex,
    timeout: Option<Duration>,
) -> Result<PatternMatch, MatchError> {
    let mut buffer = Vec::new();

    let found = match timeout {
        Some(limit) => {
            let bounded = tokio::time::timeout(limit, scan_chunks(output, regex, &mut buffer)).await;
            match bounded {
                Ok(found) => found,
                Err(_) => {
                    log::debug!("Pattern '{}' not seen within {:?}", regex.as_str(), limit);
                    return Err(MatchError::Timeout {
                        after: limit,
                        output: String::from_utf8_lossy(&buffer).into_owned(),
                    });
                }
            }
        }
        None => scan_chunks(output, regex, &mut buffer).await,
    };

    match found {
        Some(matched) => {
            output.close();
            Ok(matched)
        }
        None => Err(MatchError::NoMatch {
            output: String::from_utf8_lossy(&buffer).into_owned(),
            exit: None,
        }),
    }
}

async fn scan_chunks(
    output: &mut OutputReceiver,
    regex: &Regex,
    buffer: &mut Vec<u8>,
) -> Option<PatternMatch> {
    while let Some(chunk) = output.recv().await {
        buffer.extend_from_slice(&chunk);
        if let Some(captures) = regex.captures(buffer) {
            let matched = PatternMatch::from_captures(&captures);
            log::debug!("Pattern matched: {:?}", matched.whole());
            return Some(matched);
        }
    }
    None
}

/// Waits for `regex` to appear on the standard output of `handle`.
///
/// Same contract as [`scan_output`]; a [`MatchError::NoMatch`] additionally
/// carries the exit status if the process is gone by then.
pub async fn wait_for_pattern(
    handle: &mut ProcessHandle,
    regex: &Regex,
    timeout: Option<Duration>,
) -> Result<PatternMatch, MatchError> {
    let scanned = scan_output(handle.output_mut(), regex, timeout).await;
    match scanned {
        Err(MatchError::NoMatch { output, .. }) => {
            let exit = match tokio::time::timeout(EXIT_GRACE, handle.wait()).await {
                Ok(info) => Some(info),
                Err(_) => handle.exit_info(),
            };
            Err(MatchError::NoMatch { output, exit })
        }
        other => other,
    }
}
