//! Uncaught error and unhandled rejection capture.
//!
//! Handler records are always `error` level and attributed to
//! `<module>:<execution kind>`.

use crate::args::{Arg, ErrorLike, FormattedCall, Snapshot};
use crate::console::Console;
use crate::context::{ExecutionKind, NativeProbe};
use crate::record::LogLevel;
use std::future::Future;
use tokio::task::JoinHandle;

pub const UNCAUGHT_EXCEPTION_TAG: &str = "[Uncaught Exception]";
pub const UNHANDLED_REJECTION_TAG: &str = "[Unhandled Promise Rejection]";

/// Whether the runtime's default handling of the event should still run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Default handling suppressed. Only window-like contexts do this.
    PreventDefault,
    Default,
}

/// An uncaught exception as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UncaughtError {
    pub message: Option<String>,
    pub stack: Option<String>,
    pub filename: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    /// The thrown value, when the event wraps one. Its message and stack win
    /// over the event's own.
    pub error: Option<ErrorLike>,
}

impl UncaughtError {
    pub fn new(message: impl Into<String>) -> Self {
        UncaughtError {
            message: Some(message.into()),
            ..UncaughtError::default()
        }
    }

    pub fn at(mut self, filename: impl Into<String>, line: u32, column: u32) -> Self {
        self.filename = Some(filename.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_error(mut self, error: ErrorLike) -> Self {
        self.error = Some(error);
        self
    }

    fn location(&self) -> Option<String> {
        let file = self.filename.as_deref().filter(|f| !f.is_empty())?;
        let mut location = format!("at {file}");
        if let Some(line) = self.line {
            location.push_str(&format!(":{line}"));
            if let Some(column) = self.column {
                location.push_str(&format!(":{column}"));
            }
        }
        Some(location)
    }

    fn into_call(self) -> FormattedCall {
        let location = self.location();
        let (message, stack) = match self.error {
            Some(err) => {
                let stack = err.normalized_stack();
                (Some(err.display), stack)
            }
            None => (self.message, self.stack),
        };
        FormattedCall {
            message: tagged(UNCAUGHT_EXCEPTION_TAG, message, stack, location),
            ..FormattedCall::default()
        }
    }
}

/// A rejected future nobody handled.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: Arg,
}

impl Rejection {
    pub fn new(reason: impl Into<Arg>) -> Self {
        Rejection {
            reason: reason.into(),
        }
    }

    fn into_call(self) -> FormattedCall {
        let (message, stack) = match self.reason {
            Arg::Undefined => ("undefined".to_string(), None),
            Arg::Str(s) | Arg::Primitive(s) => (s, None),
            Arg::Error(err) => {
                let stack = err.normalized_stack();
                (err.display, stack)
            }
            Arg::Object(Snapshot::Json(value)) => (value.to_string(), None),
            Arg::Object(Snapshot::Unserializable(text)) => (text, None),
        };
        FormattedCall {
            message: tagged(UNHANDLED_REJECTION_TAG, Some(message), stack, None),
            ..FormattedCall::default()
        }
    }
}

/// `<tag> <message>`, then the stack and the location on their own lines,
/// each only when non-empty.
fn tagged(
    tag: &str,
    message: Option<String>,
    stack: Option<String>,
    location: Option<String>,
) -> String {
    let mut text = tag.to_string();
    if let Some(message) = message.filter(|m| !m.is_empty()) {
        text.push(' ');
        text.push_str(&message);
    }
    for part in [stack, location].into_iter().flatten() {
        if !part.trim().is_empty() {
            text.push('\n');
            text.push_str(&part);
        }
    }
    text
}

impl Console {
    /// Forward an uncaught exception.
    pub fn report_uncaught(&self, event: UncaughtError) -> Disposition {
        self.report(event.into_call(), self.context().kind)
    }

    /// Forward an unhandled rejection.
    pub fn report_rejection(&self, event: Rejection) -> Disposition {
        self.report(event.into_call(), self.context().kind)
    }

    fn report(&self, call: FormattedCall, kind: ExecutionKind) -> Disposition {
        if !self.forwards_errors() {
            return Disposition::Default;
        }
        let record = self.record(LogLevel::Error, call, self.context().handler_module_for(kind));
        self.enqueue(record);
        if kind.is_window_like() {
            Disposition::PreventDefault
        } else {
            Disposition::Default
        }
    }

    /// Spawn a fallible task whose error nobody awaits; an `Err` output is
    /// reported as an unhandled rejection.
    #[track_caller]
    pub fn spawn_watched<F, E>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        let console = self.clone();
        let spawned_at = std::panic::Location::caller();
        tokio::spawn(async move {
            if let Err(e) = future.await {
                let reason = ErrorLike::from_error(&e).with_frame(spawned_at);
                console.report_rejection(Rejection::new(reason));
            }
        })
    }
}

/// Report panics as uncaught exceptions.
///
/// The thread that installs the hook keeps the console's execution kind;
/// panics on any other thread are classified with [`NativeProbe`]. The
/// previously installed hook always runs afterwards, so the panic report on
/// stderr is kept, and the transport is asked to flush right away since the
/// process may be about to exit.
pub fn install_panic_hook(console: Console) {
    if !console.forwards_errors() {
        return;
    }
    let home = std::thread::current().id();
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_string());

        let backtrace = std::backtrace::Backtrace::capture();
        let mut event = UncaughtError::new(message);
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            event.stack = Some(backtrace.to_string());
        }
        if let Some(location) = info.location() {
            event = event.at(location.file(), location.line(), location.column());
        }

        let kind = if std::thread::current().id() == home {
            console.context().kind
        } else {
            ExecutionKind::detect(&NativeProbe)
        };
        console.report(event.into_call(), kind);
        console.flush();
        previous(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::console::tests::test_console;
    use crate::context::ExecutionKind;

    #[test]
    fn rejection_in_window_is_tagged_and_suffixed() {
        let (console, _echo, mut queue) =
            test_console(BridgeConfig::default(), ExecutionKind::Window);
        let disposition = console.report_rejection(Rejection::new("network down"));
        assert_eq!(disposition, Disposition::PreventDefault);

        let records = queue.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, "error");
        assert!(records[0]
            .message
            .starts_with("[Unhandled Promise Rejection] network down"));
        assert_eq!(records[0].module.as_deref(), Some("checkout:window"));
    }

    #[test]
    fn workers_keep_default_handling() {
        let (console, _echo, mut queue) =
            test_console(BridgeConfig::default(), ExecutionKind::Worker);
        let disposition = console.report_uncaught(UncaughtError::new("oops"));
        assert_eq!(disposition, Disposition::Default);
        assert_eq!(queue.records()[0].module.as_deref(), Some("checkout:worker"));
    }

    #[test]
    fn uncaught_prefers_wrapped_error_and_appends_location() {
        let (console, _echo, mut queue) =
            test_console(BridgeConfig::default(), ExecutionKind::ServiceWorker);
        let event = UncaughtError::new("Script error.")
            .at("sw.js", 12, 4)
            .with_error(ErrorLike::new(
                "TypeError: x is undefined",
                Some("TypeError: x is undefined\n    at handle (sw.js:12:4)".into()),
            ));
        console.report_uncaught(event);

        let record = &queue.records()[0];
        assert_eq!(
            record.message,
            "[Uncaught Exception] TypeError: x is undefined\n\
             at handle (sw.js:12:4)\n\
             at sw.js:12:4"
        );
        assert_eq!(record.module.as_deref(), Some("checkout:service-worker"));
    }

    #[test]
    fn empty_parts_are_omitted() {
        let (console, _echo, mut queue) =
            test_console(BridgeConfig::default(), ExecutionKind::Window);
        console.report_uncaught(UncaughtError {
            message: Some(String::new()),
            stack: Some("   ".into()),
            filename: Some(String::new()),
            ..UncaughtError::default()
        });
        assert_eq!(queue.records()[0].message, "[Uncaught Exception]");
    }

    #[test]
    fn rejection_reasons_are_stringified() {
        let (console, _echo, mut queue) =
            test_console(BridgeConfig::default(), ExecutionKind::Window);
        console.report_rejection(Rejection::new(Arg::Undefined));
        console.report_rejection(Rejection::new(serde_json::json!({"code": 503})));
        let messages: Vec<_> = queue.records().into_iter().map(|r| r.message).collect();
        assert_eq!(
            messages,
            vec![
                "[Unhandled Promise Rejection] undefined".to_string(),
                r#"[Unhandled Promise Rejection] {"code":503}"#.to_string(),
            ]
        );
    }

    #[test]
    fn forward_errors_off_disables_handlers() {
        let config = BridgeConfig {
            forward_errors: false,
            ..BridgeConfig::default()
        };
        let (console, _echo, mut queue) = test_console(config, ExecutionKind::Window);
        assert_eq!(
            console.report_rejection(Rejection::new("ignored")),
            Disposition::Default
        );
        assert!(queue.records().is_empty());
    }

    #[test]
    fn panics_on_other_threads_are_workers_and_keep_the_previous_hook() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let (console, _echo, mut queue) =
            test_console(BridgeConfig::default(), ExecutionKind::Window);
        let previous_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&previous_calls);
        std::panic::set_hook(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        install_panic_hook(console);

        let joined = std::thread::Builder::new()
            .name("render".into())
            .spawn(|| panic!("worker thread died"))
            .unwrap()
            .join();
        let _ = std::panic::take_hook();

        assert!(joined.is_err());
        assert_eq!(previous_calls.load(Ordering::SeqCst), 1);
        let records = queue.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].module.as_deref(), Some("checkout:worker"));
        assert!(records[0]
            .message
            .starts_with("[Uncaught Exception] worker thread died"));
    }

    #[tokio::test]
    async fn watched_task_errors_become_rejections() {
        let (console, _echo, mut queue) =
            test_console(BridgeConfig::default(), ExecutionKind::Worker);
        let failing = async { Err::<(), _>(std::io::Error::other("disk full")) };
        console.spawn_watched(failing).await.unwrap();
        console.spawn_watched(async { Ok::<(), std::io::Error>(()) }).await.unwrap();

        let records = queue.records();
        assert_eq!(records.len(), 1);
        assert!(records[0]
            .message
            .starts_with("[Unhandled Promise Rejection] disk full\nat "));
        assert!(records[0].message.contains("handlers.rs:"));
    }
}
