use crate::config::BridgeConfig;
use crate::ingest::{json_response, IngestEndpoint};
use crate::module_sink::{SinkRegistry, TerminalWriter, TracingWriter};
use crate::virtual_module::VirtualModule;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Minimal dev server hosting the ingestion endpoint and the client config
/// module.
#[derive(Clone)]
pub struct DevServer {
    ingest: IngestEndpoint,
    virtual_module: VirtualModule,
}

impl DevServer {
    /// Server writing client output through `tracing`.
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_writer(config, Arc::new(TracingWriter))
    }

    pub fn with_writer(config: &BridgeConfig, writer: Arc<dyn TerminalWriter>) -> Self {
        let sinks = Arc::new(SinkRegistry::new(writer));
        DevServer {
            ingest: IngestEndpoint::new(config.endpoint.clone(), sinks),
            virtual_module: VirtualModule::new(config),
        }
    }

    pub fn ingest(&self) -> &IngestEndpoint {
        &self.ingest
    }

    /// Route one request: ingestion first, then the config module, else 404.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let req = match self.ingest.try_handle(req).await {
            Ok(response) => return response,
            Err(req) => req,
        };
        match self.virtual_module.try_handle(req) {
            Ok(response) => response,
            Err(req) => {
                debug!(method = %req.method(), path = req.uri().path(), "no route");
                json_response(StatusCode::NOT_FOUND, json!({ "error": "Not Found" }))
            }
        }
    }

    /// Accept connections on `listener` until `shutdown` resolves.
    ///
    /// Aborted or reset accepts and panicking connection tasks do not stop
    /// the server; any other accept error is returned.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, endpoint = self.ingest.path(), "console bridge listening");
        }

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            let conn = tokio::select! {
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("accept failed: {e}");
                        return Err(e);
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("connection handler panicked: {:?}", e);
                        continue;
                    }
                    Ok(()) | Err(_) => continue,
                },
                _ = &mut shutdown => {
                    debug!(open = joinset.len(), "shutting down dev server");
                    joinset.abort_all();
                    return Ok(());
                }
            };

            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let this = self.clone();
            joinset.spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let this = this.clone();
                    async move { Ok::<_, Infallible>(this.handle(req).await) }
                });
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("connection error: {e}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_sink::MemoryWriter;
    use http_body_util::BodyExt;
    use hyper::Method;

    fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    #[tokio::test]
    async fn routes_ingest_config_and_fallback() {
        let writer = Arc::new(MemoryWriter::default());
        let server = DevServer::with_writer(&BridgeConfig::default(), writer.clone());

        let ok = server
            .handle(request(
                Method::POST,
                "/api/debug/client-logs",
                r#"{"logs":[{"level":"log","message":"hi","timestamp":"2024-03-01T10:00:00Z","module":"home"}]}"#,
            ))
            .await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(writer.lines()[0].text, "[log] hi");

        let config = server
            .handle(request(Method::GET, "/@console-bridge/config.json", ""))
            .await;
        assert_eq!(config.status(), StatusCode::OK);

        let missing = server
            .handle(request(Method::GET, "/api/debug/client-logs", ""))
            .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let body = missing.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"error":"Not Found"}"#);
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = DevServer::with_writer(&BridgeConfig::default(), Arc::new(MemoryWriter::default()));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(listener, async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();
        assert!(task.await.unwrap().is_ok());
    }
}
