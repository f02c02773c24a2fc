use crate::console::Console;
use crate::layer::ForwardingLayer;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::{EnvFilter, Registry};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the dev server's terminal subscriber.
///
/// **Behavior**
///
/// Installs a [`Registry`] with an `fmt` layer filtered by `RUST_LOG`
/// (default [`DEFAULT_FILTER`]). Client output written by
/// [`TracingWriter`](crate::module_sink::TracingWriter) goes through it.
pub fn init_tracing() -> Result<(), SetGlobalDefaultError> {
    let subscriber = Registry::default()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)
}

/// Install a subscriber for a client process.
///
/// **Parameters**
/// - `console`: console whose forwarding policy applies to the host
///   application's `tracing` events.
///
/// **Behavior**
///
/// Events are printed locally by the `fmt` layer (filtered by `RUST_LOG`)
/// and, independently of that filter, forwarded through
/// [`ForwardingLayer`].
pub fn init_client_tracing(console: Console) -> Result<(), SetGlobalDefaultError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_filter(env_filter());
    let subscriber = Registry::default()
        .with(ForwardingLayer::new(console))
        .with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
}
