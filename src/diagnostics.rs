//! Diagnostic reporting for recoverable lookup failures
//!
//! The enumerator and the detail loader never fail outright. Anything they skip
//! is reported here instead, so callers decide whether it ends up in a log,
//! in a test buffer, or nowhere at all.

use log::Level;
use std::sync::Mutex;

/// Log target used when diagnostics are forwarded to the `log` facade
pub const LOG_TARGET: &str = "sockowner";

/// Fire-and-forget sink for human-readable diagnostic messages
pub trait Diagnostics: Send + Sync {
    /// Report one message at the given level
    fn report(&self, level: Level, message: &str);

    fn warn(&self, message: &str) {
        self.report(Level::Warn, message);
    }

    fn debug(&self, message: &str) {
        self.report(Level::Debug, message);
    }
}

/// Forwards every report to the globally installed `log` logger
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn report(&self, level: Level, message: &str) {
        log::log!(target: LOG_TARGET, level, "{}", message);
    }
}

/// Drops every report
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentDiagnostics;

impl Diagnostics for SilentDiagnostics {
    fn report(&self, _level: Level, _message: &str) {}
}

/// Keeps every report in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    records: Mutex<Vec<(Level, String)>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded messages so far
    pub fn records(&self) -> Vec<(Level, String)> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Recorded messages at exactly `level`
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn report(&self, level: Level, message: &str) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((level, message.to_string()));
    }
}
