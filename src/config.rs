use crate::error::ConfigError;
use crate::inject::default_module_extractor;
use crate::record::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Default ingestion path, shared by the transport and the server.
pub const DEFAULT_ENDPOINT: &str = "/api/debug/client-logs";

/// Path the dev server serves the client configuration under.
pub const CONFIG_MODULE_PATH: &str = "/@console-bridge/config.json";

/// Maps an artifact path to the module name its records are attributed to.
#[derive(Clone)]
pub struct ModuleExtractor(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl ModuleExtractor {
    pub fn new(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        ModuleExtractor(Arc::new(f))
    }

    pub fn extract(&self, path: &str) -> String {
        (self.0)(path)
    }
}

impl Default for ModuleExtractor {
    fn default() -> Self {
        ModuleExtractor::new(default_module_extractor)
    }
}

impl fmt::Debug for ModuleExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModuleExtractor(..)")
    }
}

/// Options shared by both halves of the bridge, supplied once at startup.
///
/// Deserializes from the camelCase JSON form (`silentOnError`,
/// `includePatterns`, ...). Missing keys take their defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Master switch. When off, capture and transport are inert.
    pub enabled: bool,
    /// Ingestion path.
    pub endpoint: String,
    /// Levels whose calls are forwarded; other levels only echo locally.
    pub levels: BTreeSet<LogLevel>,
    /// Artifacts that receive the bootstrap block.
    pub include_patterns: Vec<String>,
    /// Artifacts that never receive it. Takes precedence over includes.
    pub exclude_patterns: Vec<String>,
    #[serde(skip)]
    pub module_extractor: ModuleExtractor,
    /// Suppress the local warning when a batch cannot be delivered.
    pub silent_on_error: bool,
    /// Capture uncaught errors and unhandled rejections.
    pub forward_errors: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            levels: LogLevel::ALL.into_iter().collect(),
            include_patterns: vec!["**/*.html".to_string()],
            exclude_patterns: vec!["**/node_modules/**".to_string()],
            module_extractor: ModuleExtractor::default(),
            silent_on_error: true,
            forward_errors: true,
        }
    }
}

impl BridgeConfig {
    /// Load a JSON config file. Keys not present keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn with_module_extractor(
        mut self,
        f: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.module_extractor = ModuleExtractor::new(f);
        self
    }

    pub fn is_level_enabled(&self, level: LogLevel) -> bool {
        self.enabled && self.levels.contains(&level)
    }
}
