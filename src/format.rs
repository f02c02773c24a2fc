use crate::error::IngestError;
use crate::record::LogRecord;
use std::fmt;

/// Indentation applied to stack and extra-data lines.
pub const MARGIN: &str = "    ";

/// Output channel a rendered record goes through.
///
/// There is no debug channel: `debug` records, and any level the server does
/// not know, go through `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkChannel {
    Error,
    Warn,
    Info,
}

impl SinkChannel {
    pub fn for_level(level: &str) -> Self {
        match level {
            "error" => SinkChannel::Error,
            "warn" => SinkChannel::Warn,
            _ => SinkChannel::Info,
        }
    }
}

/// Error rebuilt from forwarded stack frames so the terminal can print it
/// as a cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticError {
    pub message: String,
    pub stack: String,
}

impl fmt::Display for SyntheticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.message, self.stack)
    }
}

impl std::error::Error for SyntheticError {}

/// A record ready for a module sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub channel: SinkChannel,
    pub text: String,
    pub error: Option<SyntheticError>,
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("{MARGIN}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render one record as the terminal shows it:
///
/// ```text
/// [error] boom (http://localhost:5173/)
///     at checkout (cart.js:10:3)
/// Extra data:     [
///       {
///         "id": 7
///       }
///     ]
/// ```
pub fn render(record: &LogRecord) -> Result<Rendered, IngestError> {
    let mut text = format!("[{}] {}", record.level, record.message);
    if let Some(url) = record.url.as_deref().filter(|u| !u.is_empty()) {
        text.push_str(&format!(" ({url})"));
    }

    if !record.stacks.is_empty() {
        text.push('\n');
        text.push_str(
            &record
                .stacks
                .iter()
                .map(|frame| indent(frame))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }

    if !record.extra.is_empty() {
        let pretty = serde_json::to_string_pretty(&record.extra)
            .map_err(|e| IngestError::Format(e.to_string()))?;
        text.push_str("\nExtra data: ");
        text.push_str(&indent(&pretty));
    }

    let channel = SinkChannel::for_level(&record.level);
    let error = match channel {
        SinkChannel::Error if !record.stacks.is_empty() => Some(SyntheticError {
            message: record.message.clone(),
            stack: record.stacks.join("\n"),
        }),
        _ => None,
    };

    Ok(Rendered {
        channel,
        text,
        error,
    })
}
