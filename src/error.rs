/// Failure delivering a batch to the ingestion endpoint.
///
/// These never reach application code: the transport drops the batch and at
/// most reports it locally.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("failed to encode log batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[cfg(feature = "client")]
    #[error("request to ingestion endpoint failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ingestion endpoint responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),

    #[error("delivery runtime unavailable: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Rejection of an incoming batch. Every variant maps to a `400`.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("failed to format record: {0}")]
    Format(String),
}

/// Problems loading a [`BridgeConfig`](crate::config::BridgeConfig).
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
