// src/system/output_log.rs

//! Passive sinks for mirrored adapter output.
//!
//! Sinks only ever receive complete lines; [`LineMirror`] takes care of
//! re-assembling lines that arrive split across read chunks.

use crate::constants::ADAPTER_LOG_TARGET;
use std::{fmt, sync::Arc, sync::Mutex};

/// An append-only text sink for adapter output and lifecycle notices.
///
/// Implementations must not block: they are called from the tasks that drain
/// the adapter's pipes.
pub trait OutputSink: Send + Sync + fmt::Debug {
    /// Appends one line (without its terminator).
    fn append_line(&self, line: &str);
}

/// Writes every line through the `log` facade under the `adapter` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl OutputSink for LogSink {
    fn append_line(&self, line: &str) {
        log::info!(target: ADAPTER_LOG_TARGET, "{}", line);
    }
}

/// Keeps every line in memory. Handy for embedding and for diagnostics.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the lines received so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl OutputSink for MemorySink {
    fn append_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_string());
    }
}

/// Splits a byte stream into lines and forwards them to a sink.
pub(crate) struct LineMirror {
    sink: Arc<dyn OutputSink>,
    pending: Vec<u8>,
}

impl LineMirror {
    pub(crate) fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            sink,
            pending: Vec::new(),
        }
    }

    /// Feeds a chunk; every completed line is forwarded immediately.
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line);
        }
    }

    /// Forwards whatever is left after the stream ended.
    pub(crate) fn finish(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest);
        }
    }

    fn emit(&self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        self.sink.append_line(text.trim_end_matches(['\n', '\r']));
    }
}

impl fmt::Debug for LineMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineMirror")
            .field("pending", &self.pending.len())
            .finish()
    }
}
