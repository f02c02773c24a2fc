use crate::args::{build_message, Arg, FormattedCall, Snapshot};
use crate::config::BridgeConfig;
use crate::context::ExecutionContext;
use crate::record::{LogLevel, LogRecord};
use crate::transport::TransportHandle;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The local behaviour a forwarded call must keep: what the call would
/// have printed without the bridge.
pub trait LocalEcho: Send + Sync {
    fn echo(&self, level: LogLevel, args: &[Arg]);
}

/// Echoes calls as `tracing` events under the `console_bridge::echo` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEcho;

impl LocalEcho for TracingEcho {
    fn echo(&self, level: LogLevel, args: &[Arg]) {
        let text = echo_text(args);
        match level {
            LogLevel::Error => tracing::error!(target: "console_bridge::echo", "{}", text),
            LogLevel::Warn => tracing::warn!(target: "console_bridge::echo", "{}", text),
            LogLevel::Debug => tracing::debug!(target: "console_bridge::echo", "{}", text),
            LogLevel::Log | LogLevel::Info => {
                tracing::info!(target: "console_bridge::echo", "{}", text)
            }
        }
    }
}

/// Echo that prints nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentEcho;

impl LocalEcho for SilentEcho {
    fn echo(&self, _level: LogLevel, _args: &[Arg]) {}
}

/// Inline rendering for local output: structured values are shown in place.
fn echo_text(args: &[Arg]) -> String {
    args.iter()
        .map(|arg| match arg {
            Arg::Undefined => "undefined".to_string(),
            Arg::Str(s) | Arg::Primitive(s) => s.clone(),
            Arg::Error(err) => err.stack.clone().unwrap_or_else(|| err.display.clone()),
            Arg::Object(Snapshot::Json(value)) => value.to_string(),
            Arg::Object(Snapshot::Unserializable(text)) => text.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Capability-scoped console handed to application code.
///
/// Every call is echoed locally and, when its level is forwarded, turned
/// into a [`LogRecord`] attributed to this console's [`ExecutionContext`]
/// and queued on the transport. Cloning shares the same context.
#[derive(Clone)]
pub struct Console {
    inner: Arc<Inner>,
}

struct Inner {
    context: ExecutionContext,
    enabled: bool,
    levels: BTreeSet<LogLevel>,
    forward_errors: bool,
    transport: Option<TransportHandle>,
    echo: Arc<dyn LocalEcho>,
}

impl Console {
    pub fn new(
        context: ExecutionContext,
        config: &BridgeConfig,
        transport: Option<TransportHandle>,
        echo: Arc<dyn LocalEcho>,
    ) -> Self {
        Console {
            inner: Arc::new(Inner {
                context,
                enabled: config.enabled,
                levels: config.levels.clone(),
                forward_errors: config.forward_errors,
                transport,
                echo,
            }),
        }
    }

    pub fn log(&self, args: impl AsRef<[Arg]>) {
        self.emit(LogLevel::Log, args.as_ref());
    }

    pub fn info(&self, args: impl AsRef<[Arg]>) {
        self.emit(LogLevel::Info, args.as_ref());
    }

    pub fn warn(&self, args: impl AsRef<[Arg]>) {
        self.emit(LogLevel::Warn, args.as_ref());
    }

    pub fn error(&self, args: impl AsRef<[Arg]>) {
        self.emit(LogLevel::Error, args.as_ref());
    }

    pub fn debug(&self, args: impl AsRef<[Arg]>) {
        self.emit(LogLevel::Debug, args.as_ref());
    }

    /// Echo locally, then forward if `level` is wrapped.
    pub fn emit(&self, level: LogLevel, args: &[Arg]) {
        self.inner.echo.echo(level, args);
        if self.forwards(level) {
            self.forward_call(level, build_message(args));
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.inner.context
    }

    pub fn forwards(&self, level: LogLevel) -> bool {
        self.inner.enabled && self.inner.levels.contains(&level)
    }

    pub fn forwards_errors(&self) -> bool {
        self.inner.enabled && self.inner.forward_errors
    }

    pub fn transport(&self) -> Option<&TransportHandle> {
        self.inner.transport.as_ref()
    }

    /// Flush queued records without waiting for the delay timer.
    pub fn flush(&self) {
        if let Some(transport) = &self.inner.transport {
            transport.flush();
        }
    }

    pub(crate) fn forward_call(&self, level: LogLevel, call: FormattedCall) {
        let record = self.record(level, call, self.inner.context.module.clone());
        self.enqueue(record);
    }

    pub(crate) fn record(&self, level: LogLevel, call: FormattedCall, module: String) -> LogRecord {
        LogRecord {
            level: level.as_str().to_string(),
            message: call.message,
            timestamp: Utc::now(),
            url: self.inner.context.url.clone(),
            user_agent: self.inner.context.user_agent.clone(),
            module: Some(module),
            stacks: call.stacks,
            extra: call.extra,
        }
    }

    pub(crate) fn enqueue(&self, record: LogRecord) {
        if let Some(transport) = &self.inner.transport {
            transport.enqueue(record);
        }
    }
}
