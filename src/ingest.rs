use crate::error::IngestError;
use crate::format::{render, Rendered};
use crate::module_sink::SinkRegistry;
use crate::record::LogBatch;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::{header, Method, Request, Response, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Server half of the bridge: accepts `POST <path>` batches and fans the
/// records out to per-module sinks.
#[derive(Clone)]
pub struct IngestEndpoint {
    path: String,
    sinks: Arc<SinkRegistry>,
}

impl IngestEndpoint {
    /// `endpoint` may be a bare path or an absolute URL; only its path is
    /// matched against incoming requests.
    pub fn new(endpoint: impl Into<String>, sinks: Arc<SinkRegistry>) -> Self {
        let endpoint = endpoint.into();
        let path = match endpoint.parse::<hyper::Uri>() {
            Ok(uri) if uri.scheme().is_some() => uri.path().to_string(),
            _ => endpoint,
        };
        IngestEndpoint { path, sinks }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn sinks(&self) -> &Arc<SinkRegistry> {
        &self.sinks
    }

    /// Parse and render a whole batch, then dispatch it in arrival order.
    ///
    /// **Returns**
    ///
    /// The number of records dispatched. On error nothing from the batch
    /// has reached a sink.
    pub fn ingest(&self, body: &[u8]) -> Result<usize, IngestError> {
        let batch: LogBatch = serde_json::from_slice(body)?;
        let rendered = batch
            .logs
            .iter()
            .map(|record| Ok((record.module_name(), render(record)?)))
            .collect::<Result<Vec<(&str, Rendered)>, IngestError>>()?;

        for (module, line) in &rendered {
            self.sinks.sink(module).emit(line);
        }
        Ok(rendered.len())
    }

    /// Handle `req` if it is a `POST` to the ingestion path.
    ///
    /// Any other request is handed back untouched so the caller can route it
    /// further.
    pub async fn try_handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Request<B>>
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        if req.method() != Method::POST || req.uri().path() != self.path {
            return Err(req);
        }

        let result = match req.into_body().collect().await {
            Ok(collected) => self.ingest(&collected.to_bytes()),
            Err(e) => Err(IngestError::Body(e.to_string())),
        };

        Ok(match result {
            Ok(count) => {
                debug!(count, "ingested client log batch");
                json_response(StatusCode::OK, json!({ "success": true }))
            }
            Err(e) => {
                warn!("rejected client log batch: {e}");
                json_response(StatusCode::BAD_REQUEST, json!({ "error": "Invalid JSON" }))
            }
        })
    }
}

pub(crate) fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}
