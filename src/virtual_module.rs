use crate::bootstrap::ClientConfig;
use crate::config::BridgeConfig;
pub use crate::config::CONFIG_MODULE_PATH;
use crate::ingest::json_response;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;

/// Serves the client half's configuration so the bootstrap block can load it
/// before activating capture.
#[derive(Clone, Debug)]
pub struct VirtualModule {
    body: serde_json::Value,
}

impl VirtualModule {
    pub fn new(config: &BridgeConfig) -> Self {
        let body = if config.enabled {
            serde_json::to_value(ClientConfig::from(config))
                .unwrap_or_else(|_| Self::inert_stub())
        } else {
            Self::inert_stub()
        };
        VirtualModule { body }
    }

    /// What a disabled bridge serves: nothing gets activated.
    pub fn inert_stub() -> serde_json::Value {
        json!({ "enabled": false })
    }

    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    pub fn try_handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Request<B>> {
        if req.method() != Method::GET || req.uri().path() != CONFIG_MODULE_PATH {
            return Err(req);
        }
        Ok(json_response(StatusCode::OK, self.body.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn get(path: &str) -> Request<()> {
        Request::builder().method(Method::GET).uri(path).body(()).unwrap()
    }

    #[tokio::test]
    async fn serves_client_config() {
        let module = VirtualModule::new(&BridgeConfig::default());
        let response = module.try_handle(get(CONFIG_MODULE_PATH)).unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let config: ClientConfig = serde_json::from_slice(&bytes).unwrap();
        assert!(config.enabled);
        assert_eq!(config.endpoint, "/api/debug/client-logs");
        assert_eq!(config.levels.len(), 5);
    }

    #[test]
    fn disabled_config_serves_stub() {
        let module = VirtualModule::new(&BridgeConfig {
            enabled: false,
            ..BridgeConfig::default()
        });
        assert_eq!(module.body(), &json!({"enabled": false}));
        let stub: ClientConfig = serde_json::from_value(module.body().clone()).unwrap();
        assert!(!stub.enabled);
    }

    #[test]
    fn other_requests_pass_through() {
        let module = VirtualModule::new(&BridgeConfig::default());
        assert!(module.try_handle(get("/index.html")).is_err());
        let post = Request::builder()
            .method(Method::POST)
            .uri(CONFIG_MODULE_PATH)
            .body(())
            .unwrap();
        assert!(module.try_handle(post).is_err());
    }
}
