use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Module name used when an execution unit never set one.
pub const UNKNOWN_MODULE: &str = "unknown";

/// Console levels a client can forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Warn,
    Error,
    Info,
    Debug,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Log,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown log level `{0}`")]
pub struct UnknownLevel(pub String);

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

/// One captured console call or runtime error, as it travels on the wire.
///
/// `level` stays a plain string so that the server can accept records from
/// producers with a wider level vocabulary than [`LogLevel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "userAgent", default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default)]
    pub stacks: Vec<String>,
    #[serde(default)]
    pub extra: Vec<serde_json::Value>,
}

impl LogRecord {
    /// Module attribution, falling back to [`UNKNOWN_MODULE`].
    pub fn module_name(&self) -> &str {
        match self.module.as_deref() {
            Some(module) if !module.is_empty() => module,
            _ => UNKNOWN_MODULE,
        }
    }
}

/// Wire envelope: `{"logs": [...]}`. Order is preserved end to end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogBatch {
    pub logs: Vec<LogRecord>,
}

impl LogBatch {
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

impl From<Vec<LogRecord>> for LogBatch {
    fn from(logs: Vec<LogRecord>) -> Self {
        LogBatch { logs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn level_parses_case_insensitively() {
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(" debug ".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("trace".parse::<LogLevel>().is_err());
    }

    #[test]
    fn record_uses_wire_field_names() {
        let record = LogRecord {
            level: "info".into(),
            message: "hello".into(),
            timestamp: "2024-03-01T10:00:00Z".parse().unwrap(),
            url: Some("http://localhost:5173/".into()),
            user_agent: Some("native".into()),
            module: Some("checkout".into()),
            stacks: vec![],
            extra: vec![json!({"a": 1})],
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["userAgent"], "native");
        assert_eq!(value["module"], "checkout");
        assert_eq!(value["url"], "http://localhost:5173/");
        assert_eq!(value["extra"][0]["a"], 1);
        assert_eq!(value["timestamp"], "2024-03-01T10:00:00Z");
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let batch: LogBatch = serde_json::from_str(
            r#"{"logs":[{"level":"fancy","message":"m","timestamp":"2024-03-01T10:00:00.000Z"}]}"#,
        )
        .unwrap();
        let record = &batch.logs[0];
        assert_eq!(record.level, "fancy");
        assert!(record.stacks.is_empty());
        assert!(record.extra.is_empty());
        assert_eq!(record.module_name(), UNKNOWN_MODULE);
    }

    #[test]
    fn batch_requires_logs_array() {
        assert!(serde_json::from_str::<LogBatch>(r#"{"records":[]}"#).is_err());
        assert!(serde_json::from_str::<LogBatch>(r#"{"logs":{}}"#).is_err());
    }
}
