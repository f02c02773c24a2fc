use std::sync::Arc;
use tokio::net::TcpListener;

use console_bridge::console::SilentEcho;
use console_bridge::context::{ExecutionKind, FixedProbe};
use console_bridge::init::init_tracing;
use console_bridge::server::DevServer;
use console_bridge::{Arg, Bootstrap, BridgeConfig, ErrorLike, Rejection, UncaughtError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;
    let config = BridgeConfig::default();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let origin = format!("http://{}", listener.local_addr()?);
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(DevServer::new(&config).serve(listener, async {
        let _ = stopped.await;
    }));

    let bridge = Bootstrap::new(config)
        .module("search")
        .probe(FixedProbe(ExecutionKind::Worker))
        .echo(Arc::new(SilentEcho))
        .activate_http(&origin)?;
    let console = bridge.console();

    console.report_uncaught(
        UncaughtError::new("Uncaught TypeError: results is undefined")
            .at("search.worker.js", 42, 7)
            .with_error(ErrorLike::new(
                "TypeError: results is undefined",
                Some("TypeError: results is undefined\n    at rank (search.worker.js:42:7)".into()),
            )),
    );
    console.report_rejection(Rejection::new(Arg::Undefined));
    console
        .spawn_watched(async { Err::<(), _>(std::io::Error::other("index shard unavailable")) })
        .await?;

    bridge.shutdown().await;
    let _ = stop.send(());
    server.await??;
    Ok(())
}
