use crate::args::{Arg, ErrorLike, FormattedCall, Snapshot, build_message};
use crate::console::Console;
use crate::record::LogLevel;
use std::collections::BTreeMap;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that forwards `tracing` events of the host
/// application through a [`Console`].
///
/// The event message becomes the record message; remaining fields are
/// snapshotted into one extra object (referenced by an `[extra#n]`
/// placeholder) and fields recorded as errors contribute stacks. Events from
/// this crate's own targets are ignored so the bridge never forwards itself.
pub struct ForwardingLayer {
    console: Console,
}

impl ForwardingLayer {
    pub fn new(console: Console) -> Self {
        ForwardingLayer { console }
    }
}

/// Console level for a `tracing` level.
pub fn console_level(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        Level::DEBUG => LogLevel::Debug,
        Level::TRACE => LogLevel::Log,
    }
}

impl<S> Layer<S> for ForwardingLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with("console_bridge") {
            return;
        }
        let level = console_level(meta.level());
        if !self.console.forwards(level) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut errors = Vec::new();

        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
            errors: &mut errors,
        };
        event.record(&mut visitor);

        let mut args = vec![Arg::Str(message.unwrap_or_default())];
        args.extend(errors.into_iter().map(|err| match (meta.file(), meta.line()) {
            (Some(file), Some(line)) => Arg::Error(err.with_frame(format_args!("{file}:{line}"))),
            _ => Arg::Error(err),
        }));
        if !fields.is_empty() {
            args.push(Arg::Object(Snapshot::Json(serde_json::Value::Object(
                fields.into_iter().collect(),
            ))));
        }

        let call: FormattedCall = build_message(&args);
        self.console.forward_call(level, call);
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, serde_json::Value>,
    pub message: &'a mut Option<String>,
    pub errors: &'a mut Vec<ErrorLike>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.errors.push(ErrorLike::from_error(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
