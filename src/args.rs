//! Classification and flattening of console call arguments.
//!
//! Every argument is captured as an [`Arg`] at the call site, so the
//! "does this look like an error" question is answered by the variant
//! instead of by probing the value at flush time.

use serde::Serialize;
use std::error::Error;
use std::fmt;

/// An error-shaped argument: its string form plus an optional stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLike {
    pub display: String,
    pub stack: Option<String>,
}

impl ErrorLike {
    pub fn new(display: impl Into<String>, stack: Option<String>) -> Self {
        ErrorLike {
            display: display.into(),
            stack,
        }
    }

    /// Builds the stack from the `source()` chain. The first line repeats the
    /// error's own string form, as a runtime stack trace would.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let display = err.to_string();
        let mut stack = display.clone();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push_str("\n    caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        ErrorLike {
            display,
            stack: Some(stack),
        }
    }

    /// Append one `    at <location>` frame to the stack.
    pub fn with_frame(mut self, location: impl fmt::Display) -> Self {
        let mut stack = self.stack.take().unwrap_or_else(|| self.display.clone());
        stack.push_str(&format!("\n    at {location}"));
        self.stack = Some(stack);
        self
    }

    /// Stack text with a duplicated leading copy of the string form removed
    /// and leading whitespace trimmed. `None` when nothing remains.
    pub fn normalized_stack(&self) -> Option<String> {
        let stack = self.stack.as_deref()?;
        let rest = stack.strip_prefix(self.display.as_str()).unwrap_or(stack);
        let rest = rest.trim_start();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }
}

/// Snapshot of a structured argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// Survived the serialize/deserialize round trip.
    Json(serde_json::Value),
    /// Serialization failed; the value's debug form stands in for it.
    Unserializable(String),
}

impl Snapshot {
    /// Round-trips `value` through JSON text. Failure degrades to the
    /// value's `Debug` output.
    pub fn capture<T: Serialize + fmt::Debug + ?Sized>(value: &T) -> Self {
        let round_trip = serde_json::to_string(value)
            .and_then(|text| serde_json::from_str::<serde_json::Value>(&text));
        match round_trip {
            Ok(json) => Snapshot::Json(json),
            Err(_) => Snapshot::Unserializable(format!("{:?}", value)),
        }
    }

    pub fn into_value(self) -> serde_json::Value {
        match self {
            Snapshot::Json(value) => value,
            Snapshot::Unserializable(text) => serde_json::Value::String(text),
        }
    }
}

/// One argument of a console call.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Undefined,
    Str(String),
    Error(ErrorLike),
    Object(Snapshot),
    /// Numbers, booleans, null: anything rendered by its plain string form.
    Primitive(String),
}

impl Arg {
    pub fn object<T: Serialize + fmt::Debug + ?Sized>(value: &T) -> Self {
        Arg::Object(Snapshot::capture(value))
    }

    #[track_caller]
    pub fn error(err: &(dyn Error + 'static)) -> Self {
        Arg::Error(ErrorLike::from_error(err).with_frame(std::panic::Location::caller()))
    }

    pub fn display(value: impl fmt::Display) -> Self {
        Arg::Primitive(value.to_string())
    }

    pub fn null() -> Self {
        Arg::Primitive("null".to_string())
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Str(value.clone())
    }
}

impl From<ErrorLike> for Arg {
    fn from(value: ErrorLike) -> Self {
        Arg::Error(value)
    }
}

impl From<serde_json::Value> for Arg {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Arg::Str(s),
            serde_json::Value::Null => Arg::null(),
            serde_json::Value::Bool(b) => Arg::display(b),
            serde_json::Value::Number(n) => Arg::display(n),
            other => Arg::Object(Snapshot::Json(other)),
        }
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Arg::Undefined)
    }
}

macro_rules! primitive_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Arg {
            fn from(value: $ty) -> Self {
                Arg::display(value)
            }
        })*
    };
}

primitive_from!(bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

/// Builds a `Vec<Arg>` from heterogeneous values.
///
/// ```
/// use console_bridge::{args, args::Arg};
/// let user = serde_json::json!({"id": 7});
/// let a = args!["checkout failed for", Arg::object(&user), 3];
/// assert_eq!(a.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        vec![$($crate::args::Arg::from($arg)),*]
    };
}

/// Result of flattening one call's arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormattedCall {
    pub message: String,
    pub stacks: Vec<String>,
    pub extra: Vec<serde_json::Value>,
}

/// Joins the arguments with single spaces. Structured values are moved to
/// `extra` and replaced by `[extra#n]` (1-based), error stacks go to
/// `stacks`.
pub fn build_message(args: &[Arg]) -> FormattedCall {
    let mut call = FormattedCall::default();
    let mut segments = Vec::with_capacity(args.len());

    for arg in args {
        let segment = match arg {
            Arg::Undefined => "undefined".to_string(),
            Arg::Str(s) => s.clone(),
            Arg::Error(err) => {
                if let Some(stack) = err.normalized_stack() {
                    call.stacks.push(stack);
                }
                err.display.clone()
            }
            Arg::Object(snapshot) => {
                call.extra.push(snapshot.clone().into_value());
                format!("[extra#{}]", call.extra.len())
            }
            Arg::Primitive(s) => s.clone(),
        };
        segments.push(segment);
    }

    call.message = segments.join(" ");
    call
}
