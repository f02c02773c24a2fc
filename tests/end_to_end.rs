use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_subscriber::layer::SubscriberExt;

use console_bridge::args;
use console_bridge::console::SilentEcho;
use console_bridge::context::{ExecutionKind, FixedProbe};
use console_bridge::format::SinkChannel;
use console_bridge::layer::ForwardingLayer;
use console_bridge::module_sink::MemoryWriter;
use console_bridge::server::DevServer;
use console_bridge::{Arg, Bootstrap, BridgeConfig, ClientConfig, Rejection};

struct RunningServer {
    origin: String,
    writer: Arc<MemoryWriter>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    async fn start(config: &BridgeConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let writer = Arc::new(MemoryWriter::default());
        let server = DevServer::with_writer(config, writer.clone());
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(listener, async {
            let _ = stopped.await;
        }));
        RunningServer {
            origin,
            writer,
            stop,
            task,
        }
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        self.task.await.unwrap().unwrap();
    }
}

fn client(config: BridgeConfig, module: &str, kind: ExecutionKind) -> Bootstrap {
    Bootstrap::new(config)
        .module(module)
        .probe(FixedProbe(kind))
        .echo(Arc::new(SilentEcho))
}

#[tokio::test]
async fn error_with_stack_reaches_the_module_sink() {
    let server = RunningServer::start(&BridgeConfig::default()).await;
    let bridge = client(BridgeConfig::default(), "checkout", ExecutionKind::Window)
        .activate_http(&server.origin)
        .unwrap();

    let err = std::io::Error::other("boom");
    bridge.console().error(args![Arg::error(&err)]);
    bridge.shutdown().await;

    let lines = server.writer.lines();
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line.module, "checkout");
    assert_eq!(line.channel, SinkChannel::Error);
    assert!(line.text.starts_with("[error] boom\n    at "), "{}", line.text);
    assert!(line.text.contains("end_to_end.rs:"));
    assert_eq!(line.error.as_ref().map(|e| e.message.as_str()), Some("boom"));

    server.stop().await;
}

#[tokio::test]
async fn calls_arrive_once_and_in_order() {
    let server = RunningServer::start(&BridgeConfig::default()).await;
    let bridge = client(BridgeConfig::default(), "search", ExecutionKind::Window)
        .url("http://localhost:5173/search")
        .activate_http(&server.origin)
        .unwrap();

    bridge.console().info(args!["query", serde_json::json!({ "q": "shoes" })]);
    bridge.console().warn(args!["slow response", 1200]);
    bridge.console().debug(args!["cache miss"]);
    bridge.shutdown().await;

    let texts: Vec<_> = server.writer.lines().into_iter().map(|l| l.text).collect();
    assert_eq!(
        texts,
        vec![
            "[info] query [extra#1] (http://localhost:5173/search)\nExtra data:     [\n      {\n        \"q\": \"shoes\"\n      }\n    ]".to_string(),
            "[warn] slow response 1200 (http://localhost:5173/search)".to_string(),
            "[debug] cache miss (http://localhost:5173/search)".to_string(),
        ]
    );

    server.stop().await;
}

#[tokio::test]
async fn rejection_in_window_is_attributed_with_suffix() {
    let server = RunningServer::start(&BridgeConfig::default()).await;
    let bridge = client(BridgeConfig::default(), "checkout", ExecutionKind::Window)
        .activate_http(&server.origin)
        .unwrap();

    bridge
        .console()
        .report_rejection(Rejection::new("network down"));
    bridge.shutdown().await;

    let lines = server.writer.lines();
    assert_eq!(lines[0].module, "checkout:window");
    assert!(lines[0]
        .text
        .starts_with("[error] [Unhandled Promise Rejection] network down"));

    server.stop().await;
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let server = RunningServer::start(&BridgeConfig::default()).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/debug/client-logs", server.origin))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "Invalid JSON" }));
    assert!(server.writer.lines().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn client_config_is_served_to_the_client() {
    let config = BridgeConfig {
        endpoint: "/logs".into(),
        ..BridgeConfig::default()
    };
    let server = RunningServer::start(&config).await;

    let fetched = ClientConfig::fetch(&server.origin).await.unwrap();
    assert!(fetched.enabled);
    assert_eq!(fetched.endpoint, "/logs");

    let bridge = client(BridgeConfig::from(fetched), "cart", ExecutionKind::Worker)
        .activate_http(&server.origin)
        .unwrap();
    bridge.console().log(args!["added", 2, "items"]);
    bridge.shutdown().await;

    let lines = server.writer.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].module, "cart");
    assert_eq!(lines[0].text, "[log] added 2 items");

    server.stop().await;
}

#[tokio::test]
async fn forwarded_tracing_event_arrives_exactly_once() {
    let server = RunningServer::start(&BridgeConfig::default()).await;
    let bridge = client(BridgeConfig::default(), "checkout", ExecutionKind::Window)
        .activate_http(&server.origin)
        .unwrap();

    let subscriber =
        tracing_subscriber::registry().with(ForwardingLayer::new(bridge.console().clone()));
    let guard = tracing::subscriber::set_default(subscriber);

    tracing::info!("one application event");
    // Long enough for several flush delays, so any feedback would show up.
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;

    let lines = server.writer.lines();
    let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(texts, vec!["[info] one application event"]);
    assert_eq!(lines[0].module, "checkout");

    drop(guard);
    bridge.shutdown().await;
    assert_eq!(server.writer.lines().len(), 1);

    server.stop().await;
}
