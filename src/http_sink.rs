use crate::error::TransportError;
use crate::record::LogBatch;
use crate::sink::BatchSink;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tracing::subscriber::NoSubscriber;

/// Configuration for [`HttpSink`].
#[derive(Clone, Debug)]
pub struct HttpSinkConfig {
    /// Full ingestion URL, e.g. `http://127.0.0.1:5173/api/debug/client-logs`.
    pub url: String,
    /// Upper bound for a single POST.
    pub timeout: Duration,
}

impl HttpSinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        HttpSinkConfig {
            url: url.into(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Runtime on a dedicated thread where every `tracing` dispatch goes to
/// [`NoSubscriber`].
///
/// The HTTP stack logs through `tracing` while it sends, including from the
/// connection tasks it spawns. Running it here keeps those events away from
/// a [`ForwardingLayer`](crate::layer::ForwardingLayer), which would
/// otherwise turn every delivered batch into the next one.
struct DeliveryRuntime {
    handle: Handle,
    _stop: oneshot::Sender<()>,
}

fn silence_thread() {
    // The thread belongs to the delivery runtime for its whole life.
    std::mem::forget(tracing::subscriber::set_default(NoSubscriber::default()));
}

impl DeliveryRuntime {
    fn start() -> Result<Self, TransportError> {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (stop, stopped) = oneshot::channel::<()>();

        std::thread::Builder::new()
            .name("console-bridge-delivery".into())
            .spawn(move || {
                silence_thread();
                let runtime = match Builder::new_current_thread()
                    .enable_all()
                    .on_thread_start(silence_thread)
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));
                runtime.block_on(async {
                    let _ = stopped.await;
                });
            })?;

        let handle = handle_rx.recv().map_err(|_| {
            std::io::Error::other("delivery thread exited before starting its runtime")
        })??;
        Ok(DeliveryRuntime {
            handle,
            _stop: stop,
        })
    }
}

/// Posts each batch as `{"logs": [...]}` to the ingestion endpoint.
///
/// Requests run on a private runtime thread that the sink stops when the
/// last clone is dropped.
#[derive(Clone)]
pub struct HttpSink {
    client: Client,
    url: Url,
    runtime: Arc<DeliveryRuntime>,
}

impl HttpSink {
    /// Construct a sink for the given configuration.
    ///
    /// **Returns**
    /// - `Err(TransportError::InvalidEndpoint)` if the URL does not parse.
    /// - `Err(TransportError::Runtime)` if the delivery thread cannot start.
    pub fn new(config: HttpSinkConfig) -> Result<Self, TransportError> {
        let url = Url::parse(&config.url)
            .map_err(|_| TransportError::InvalidEndpoint(config.url.clone()))?;
        let client = Client::builder().timeout(config.timeout).build()?;
        let runtime = Arc::new(DeliveryRuntime::start()?);
        Ok(Self {
            client,
            url,
            runtime,
        })
    }

    /// Sink for `endpoint` served by the dev server at `origin`.
    pub fn for_origin(origin: &str, endpoint: &str) -> Result<Self, TransportError> {
        let url = resolve_endpoint(origin, endpoint)?;
        Self::new(HttpSinkConfig::new(url.to_string()))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Joins a configured endpoint onto a dev server origin. An endpoint that is
/// already an absolute URL is used as-is.
pub fn resolve_endpoint(origin: &str, endpoint: &str) -> Result<Url, TransportError> {
    if let Ok(url) = Url::parse(endpoint) {
        return Ok(url);
    }
    let base = Url::parse(origin).map_err(|_| TransportError::InvalidEndpoint(origin.to_string()))?;
    base.join(endpoint)
        .map_err(|_| TransportError::InvalidEndpoint(endpoint.to_string()))
}

#[async_trait]
impl BatchSink for HttpSink {
    async fn send(&self, batch: &LogBatch) -> Result<(), TransportError> {
        let body = serde_json::to_vec(batch)?;
        let request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        let delivery = self.runtime.handle.spawn(async move {
            let resp = request.send().await?;
            if resp.status().is_success() {
                Ok::<(), TransportError>(())
            } else {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
                Err(TransportError::Status { status, body })
            }
        });
        delivery
            .await
            .map_err(|e| TransportError::Runtime(std::io::Error::other(e.to_string())))?
    }
}
