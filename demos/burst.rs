use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

use console_bridge::args;
use console_bridge::console::SilentEcho;
use console_bridge::context::{ExecutionKind, FixedProbe};
use console_bridge::init::init_tracing;
use console_bridge::server::DevServer;
use console_bridge::transport::TransportStats;
use console_bridge::{Bootstrap, BridgeConfig};

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
        .module_from_path("/app/src/checkout/index.html")
        .probe(FixedProbe(ExecutionKind::Window))
        .url(format!("{origin}/checkout"))
        .echo(Arc::new(SilentEcho))
        .activate_http(&origin)?;

    let n: u64 = 120;
    let start = Instant::now();
    for i in 0..n {
        bridge
            .console()
            .log(args!["burst", i, serde_json::json!({ "iteration": i })]);
    }
    let elapsed = start.elapsed();

    let stats = bridge.transport().map(|t| Arc::clone(t.stats()));
    bridge.shutdown().await;

    if let Some(stats) = stats {
        println!(
            "captured {} calls in {:?}, {} batches delivered, {} failed, {} dropped",
            n,
            elapsed,
            TransportStats::get(&stats.delivered_batches),
            TransportStats::get(&stats.failed_batches),
            TransportStats::get(&stats.dropped_records),
        );
    }

    let _ = stop.send(());
    server.await??;
    Ok(())
}
