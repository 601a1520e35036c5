use std::sync::Mutex;

/// Diagnostic sink handed to the location finder.
pub trait FinderLog: Send + Sync {
    fn trace(&self, message: &str);
    fn debug(&self, message: &str);
    fn warn(&self, message: &str);
}

/// Forwards to `tracing` under the `marktrack::finder` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl FinderLog for TracingLog {
    fn trace(&self, message: &str) {
        tracing::trace!(target: "marktrack::finder", "{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!(target: "marktrack::finder", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "marktrack::finder", "{message}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Warn,
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: LogLevel, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl FinderLog for RecordingLog {
    fn trace(&self, message: &str) {
        self.push(LogLevel::Trace, message);
    }

    fn debug(&self, message: &str) {
        self.push(LogLevel::Debug, message);
    }

    fn warn(&self, message: &str) {
        self.push(LogLevel::Warn, message);
    }
}
