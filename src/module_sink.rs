//! Per-module output handles on the server side.

use crate::format::{Rendered, SinkChannel, SyntheticError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Where module sinks write. Implementations must tolerate concurrent
/// requests.
pub trait TerminalWriter: Send + Sync {
    fn write(&self, module: &str, channel: SinkChannel, text: &str, error: Option<&SyntheticError>);
}

/// Writes through `tracing`, with the line prefixed by `[module]` and the
/// module also attached as a field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingWriter;

impl TerminalWriter for TracingWriter {
    fn write(&self, module: &str, channel: SinkChannel, text: &str, error: Option<&SyntheticError>) {
        match (channel, error) {
            (SinkChannel::Error, Some(err)) => tracing::error!(
                target: "console_bridge::client",
                module,
                error = err as &(dyn std::error::Error + 'static),
                "[{}] {}",
                module,
                text
            ),
            (SinkChannel::Error, None) => {
                tracing::error!(target: "console_bridge::client", module, "[{}] {}", module, text)
            }
            (SinkChannel::Warn, _) => {
                tracing::warn!(target: "console_bridge::client", module, "[{}] {}", module, text)
            }
            (SinkChannel::Info, _) => {
                tracing::info!(target: "console_bridge::client", module, "[{}] {}", module, text)
            }
        }
    }
}

/// One line as captured by [`MemoryWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenLine {
    pub module: String,
    pub channel: SinkChannel,
    pub text: String,
    pub error: Option<SyntheticError>,
}

/// Keeps every written line in memory.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    lines: Mutex<Vec<WrittenLine>>,
}

impl MemoryWriter {
    pub fn lines(&self) -> Vec<WrittenLine> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl TerminalWriter for MemoryWriter {
    fn write(&self, module: &str, channel: SinkChannel, text: &str, error: Option<&SyntheticError>) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(WrittenLine {
                module: module.to_string(),
                channel,
                text: text.to_string(),
                error: error.cloned(),
            });
        }
    }
}

/// Output handle labelled with one module name. Immutable once created.
pub struct ModuleSink {
    module: String,
    writer: Arc<dyn TerminalWriter>,
}

impl ModuleSink {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn emit(&self, rendered: &Rendered) {
        self.writer.write(
            &self.module,
            rendered.channel,
            &rendered.text,
            rendered.error.as_ref(),
        );
    }
}

/// Lazily created sinks, one per module, kept for the life of the server.
pub struct SinkRegistry {
    writer: Arc<dyn TerminalWriter>,
    sinks: RwLock<HashMap<String, Arc<ModuleSink>>>,
}

impl SinkRegistry {
    pub fn new(writer: Arc<dyn TerminalWriter>) -> Self {
        SinkRegistry {
            writer,
            sinks: RwLock::new(HashMap::new()),
        }
    }

    /// Sink for `module`, created on first use.
    pub fn sink(&self, module: &str) -> Arc<ModuleSink> {
        if let Some(sink) = self
            .sinks
            .read()
            .ok()
            .and_then(|sinks| sinks.get(module).cloned())
        {
            return sink;
        }

        let mut sinks = match self.sinks.write() {
            Ok(sinks) => sinks,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(sinks.entry(module.to_string()).or_insert_with(|| {
            tracing::debug!(module, "creating module sink");
            Arc::new(ModuleSink {
                module: module.to_string(),
                writer: Arc::clone(&self.writer),
            })
        }))
    }

    pub fn modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = self
            .sinks
            .read()
            .map(|sinks| sinks.keys().cloned().collect())
            .unwrap_or_default();
        modules.sort();
        modules
    }

    pub fn len(&self) -> usize {
        self.sinks.read().map(|sinks| sinks.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        SinkRegistry::new(Arc::new(TracingWriter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinks_are_created_once_per_module() {
        let writer = Arc::new(MemoryWriter::default());
        let registry = SinkRegistry::new(writer.clone());

        let a = registry.sink("checkout");
        let b = registry.sink("checkout");
        let c = registry.sink("search");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.modules(), vec!["checkout", "search"]);
    }

    #[test]
    fn emitted_lines_carry_module_label() {
        let writer = Arc::new(MemoryWriter::default());
        let registry = SinkRegistry::new(writer.clone());
        registry.sink("cart").emit(&Rendered {
            channel: SinkChannel::Warn,
            text: "[warn] low stock".into(),
            error: None,
        });
        let lines = writer.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].module, "cart");
        assert_eq!(lines[0].channel, SinkChannel::Warn);
        assert_eq!(lines[0].text, "[warn] low stock");
    }

    #[test]
    fn concurrent_lookups_share_one_sink() {
        let registry = Arc::new(SinkRegistry::new(Arc::new(MemoryWriter::default())));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.sink("worker"))
            })
            .collect();
        let sinks: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(sinks.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }
}
