//! Client activation: establish the module context, then start capture.

use crate::config::BridgeConfig;
use crate::console::{Console, LocalEcho, TracingEcho};
use crate::context::{ExecutionContext, ExecutionKind, NativeProbe, RuntimeProbe};
use crate::handlers::install_panic_hook;
use crate::record::LogLevel;
use crate::sink::BatchSink;
use crate::transport::{Transport, TransportConfig, TransportHandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// The part of [`BridgeConfig`] a client needs, as served by the dev server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub levels: BTreeSet<LogLevel>,
    pub silent_on_error: bool,
    pub forward_errors: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for ClientConfig {
    fn from(config: &BridgeConfig) -> Self {
        ClientConfig {
            enabled: config.enabled,
            endpoint: config.endpoint.clone(),
            levels: config.levels.clone(),
            silent_on_error: config.silent_on_error,
            forward_errors: config.forward_errors,
        }
    }
}

impl From<ClientConfig> for BridgeConfig {
    fn from(config: ClientConfig) -> Self {
        BridgeConfig {
            enabled: config.enabled,
            endpoint: config.endpoint,
            levels: config.levels,
            silent_on_error: config.silent_on_error,
            forward_errors: config.forward_errors,
            ..BridgeConfig::default()
        }
    }
}

#[cfg(feature = "client")]
impl ClientConfig {
    /// Load the config module served by the dev server at `origin`.
    pub async fn fetch(origin: &str) -> Result<Self, crate::error::TransportError> {
        let url = crate::http_sink::resolve_endpoint(origin, crate::config::CONFIG_MODULE_PATH)?;
        let resp = reqwest::get(url).await?;
        if !resp.status().is_success() {
            return Err(crate::error::TransportError::Status {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp.json().await?)
    }
}

/// Builder that sets up one execution unit's console.
///
/// The module name is fixed before [`Bootstrap::activate`] hands out the
/// [`Console`], so no call can be made before attribution exists.
pub struct Bootstrap {
    config: BridgeConfig,
    module: Option<String>,
    probe: Box<dyn RuntimeProbe + Send>,
    url: Option<String>,
    user_agent: Option<String>,
    echo: Arc<dyn LocalEcho>,
    transport: TransportConfig,
    capture_panics: bool,
}

impl Bootstrap {
    pub fn new(config: BridgeConfig) -> Self {
        Bootstrap {
            config,
            module: None,
            probe: Box::new(NativeProbe),
            url: None,
            user_agent: None,
            echo: Arc::new(TracingEcho),
            transport: TransportConfig::default(),
            capture_panics: false,
        }
    }

    pub fn module(mut self, name: impl Into<String>) -> Self {
        self.module = Some(name.into());
        self
    }

    /// Derive the module name from the artifact path with the configured
    /// extractor.
    pub fn module_from_path(mut self, path: &str) -> Self {
        self.module = Some(self.config.module_extractor.extract(path));
        self
    }

    pub fn probe(mut self, probe: impl RuntimeProbe + Send + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn echo(mut self, echo: Arc<dyn LocalEcho>) -> Self {
        self.echo = echo;
        self
    }

    /// Override batching settings. `silent_on_error` and `flush_on_teardown`
    /// are still derived from the config and the execution kind.
    pub fn transport_config(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Also report panics as uncaught exceptions (process-wide hook).
    pub fn capture_panics(mut self, capture: bool) -> Self {
        self.capture_panics = capture;
        self
    }

    fn context(&self) -> ExecutionContext {
        let kind = ExecutionKind::detect(self.probe.as_ref());
        let mut context = ExecutionContext::new(self.module.clone().unwrap_or_default(), kind);
        context.url = self.url.clone();
        if let Some(user_agent) = &self.user_agent {
            context.user_agent = Some(user_agent.clone());
        }
        context
    }

    /// Start capture with `sink` as the delivery target.
    ///
    /// With `enabled == false` the returned bridge is inert: its console
    /// only echoes and no worker is spawned. Otherwise this must run inside a
    /// Tokio runtime.
    pub fn activate(self, sink: Arc<dyn BatchSink>) -> ActiveBridge {
        let context = self.context();
        if !self.config.enabled {
            debug!(module = %context.module, "console bridge disabled, installing inert console");
            let console = Console::new(context, &self.config, None, self.echo);
            return ActiveBridge {
                console,
                transport: None,
            };
        }

        let transport_config = TransportConfig {
            silent_on_error: self.config.silent_on_error,
            flush_on_teardown: context.kind.is_window_like(),
            ..self.transport
        };
        let (handle, task) = Transport::spawn(sink, transport_config);
        debug!(module = %context.module, kind = %context.kind, "console bridge active");

        let console = Console::new(context, &self.config, Some(handle.clone()), self.echo);
        if self.capture_panics {
            install_panic_hook(console.clone());
        }
        ActiveBridge {
            console,
            transport: Some((handle, task)),
        }
    }

    /// Start capture posting to the configured endpoint on `origin`.
    #[cfg(feature = "client")]
    pub fn activate_http(self, origin: &str) -> Result<ActiveBridge, crate::error::TransportError> {
        if !self.config.enabled {
            return Ok(self.activate(Arc::new(crate::noop_sink::NoopSink)));
        }
        let sink = crate::http_sink::HttpSink::for_origin(origin, &self.config.endpoint)?;
        Ok(self.activate(Arc::new(sink)))
    }
}

/// A running bridge for one execution unit.
pub struct ActiveBridge {
    console: Console,
    transport: Option<(TransportHandle, JoinHandle<()>)>,
}

impl ActiveBridge {
    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn is_inert(&self) -> bool {
        self.transport.is_none()
    }

    pub fn transport(&self) -> Option<&TransportHandle> {
        self.transport.as_ref().map(|(handle, _)| handle)
    }

    /// Flush everything queued and wait for delivery attempts to finish.
    pub async fn shutdown(self) {
        if let Some((handle, task)) = self.transport {
            handle.close().await;
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::console::SilentEcho;
    use crate::context::FixedProbe;
    use crate::error::TransportError;
    use crate::record::LogBatch;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<LogBatch>>);

    #[async_trait]
    impl BatchSink for CollectingSink {
        async fn send(&self, batch: &LogBatch) -> Result<(), TransportError> {
            self.0.lock().unwrap().push(batch.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn module_is_attributed_from_the_first_call() {
        let sink = Arc::new(CollectingSink::default());
        let bridge = Bootstrap::new(BridgeConfig::default())
            .module_from_path("/app/src/checkout/index.html")
            .probe(FixedProbe(ExecutionKind::Window))
            .url("http://localhost:5173/checkout")
            .echo(Arc::new(SilentEcho))
            .activate(sink.clone());

        bridge.console().log(args!["mounted"]);
        bridge.shutdown().await;

        let batches = sink.0.lock().unwrap();
        let record = &batches[0].logs[0];
        assert_eq!(record.module.as_deref(), Some("checkout"));
        assert_eq!(record.url.as_deref(), Some("http://localhost:5173/checkout"));
    }

    #[tokio::test]
    async fn disabled_config_yields_inert_bridge() {
        let sink = Arc::new(CollectingSink::default());
        let bridge = Bootstrap::new(BridgeConfig {
            enabled: false,
            ..BridgeConfig::default()
        })
        .module("checkout")
        .echo(Arc::new(SilentEcho))
        .activate(sink.clone());

        assert!(bridge.is_inert());
        bridge.console().error(args!["nobody hears this"]);
        bridge.shutdown().await;
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn client_config_round_trips_through_bridge_config() {
        let json = r#"{"enabled":true,"endpoint":"/logs","levels":["error"],"silentOnError":false,"forwardErrors":false}"#;
        let client: ClientConfig = serde_json::from_str(json).unwrap();
        let bridge = BridgeConfig::from(client.clone());
        assert_eq!(bridge.endpoint, "/logs");
        assert!(!bridge.forward_errors);
        assert_eq!(ClientConfig::from(&bridge), client);
    }
}
