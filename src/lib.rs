//! Forwards client-side console output and uncaught errors to the dev server
//! terminal, tagged by the module that produced them.
//!
//! The client half ([`bootstrap`], [`console`], [`transport`]) captures calls
//! and ships them in batches; the server half ([`ingest`], [`format`],
//! [`module_sink`]) renders each record through a per-module sink.

pub mod args;
pub mod bootstrap;
pub mod config;
pub mod console;
pub mod context;
pub mod env;
pub mod error;
pub mod format;
pub mod glob;
pub mod handlers;
pub mod init;
pub mod inject;
pub mod layer;
pub mod module_sink;
pub mod noop_sink;
pub mod record;
pub mod sink;
pub mod transport;

#[cfg(feature = "client")]
pub mod http_sink;

#[cfg(feature = "server")]
pub mod ingest;
#[cfg(feature = "server")]
pub mod server;
#[cfg(feature = "server")]
pub mod virtual_module;

pub use args::{Arg, ErrorLike};
pub use bootstrap::{ActiveBridge, Bootstrap, ClientConfig};
pub use config::BridgeConfig;
pub use console::Console;
pub use context::ExecutionKind;
pub use handlers::{Disposition, Rejection, UncaughtError};
pub use record::{LogBatch, LogLevel, LogRecord};
