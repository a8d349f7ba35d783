//! Diagnostic sink for non-fatal failures.
//!
//! The controller reports completion-handler failures here instead of
//! through a global logger, so tests can observe them.

use parking_lot::Mutex;

/// Category used for sound diagnostics unless configured otherwise.
pub const DEFAULT_CATEGORY: &str = "Media.Sound";

/// Receives non-fatal diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn error(&self, category: &str, message: &str);
}

/// Forwards diagnostics to the `log` facade, using the category as target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn error(&self, category: &str, message: &str) {
        log::error!(target: category, "chime: {}", message);
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(category, message)` pairs received so far.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn error(&self, category: &str, message: &str) {
        self.entries
            .lock()
            .push((category.to_string(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.error("A", "first");
        sink.error("B", "second");
        assert_eq!(sink.len(), 2);
        assert_eq!(
            sink.entries(),
            vec![("A".into(), "first".into()), ("B".into(), "second".into())]
        );
    }

    #[test]
    fn log_sink_does_not_panic_without_logger() {
        LogSink.error(DEFAULT_CATEGORY, "nobody listening");
    }
}
