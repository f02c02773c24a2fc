//! Build-time glue: derive module names from artifact paths and add the
//! bootstrap block to selected HTML artifacts.

use crate::config::{BridgeConfig, CONFIG_MODULE_PATH};
use crate::glob;
use crate::record::UNKNOWN_MODULE;
use std::path::Path;
use tracing::trace;

/// Marker identifying an already injected artifact.
pub const BOOTSTRAP_MARKER: &str = r#"id="console-bridge""#;

/// Module name for an artifact path.
///
/// Prefers the directory right after a `src` segment, then the parent
/// directory, then the file stem, then `"unknown"`.
pub fn default_module_extractor(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(pos) = segments.iter().position(|s| *s == "src") {
        if pos + 2 < segments.len() {
            return segments[pos + 1].to_string();
        }
    }
    if segments.len() >= 2 {
        return segments[segments.len() - 2].to_string();
    }
    segments
        .last()
        .and_then(|file| Path::new(file).file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(UNKNOWN_MODULE)
        .to_string()
}

/// Outcome of [`Injector::transform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    /// The artifact is not selected by the include/exclude patterns.
    Skipped,
    /// Selected but already carries the bootstrap block.
    Unchanged,
    Injected(String),
}

pub struct Injector {
    config: BridgeConfig,
}

impl Injector {
    pub fn new(config: BridgeConfig) -> Self {
        Injector { config }
    }

    pub fn selects(&self, path: &str) -> bool {
        glob::matches(
            path,
            &self.config.include_patterns,
            &self.config.exclude_patterns,
        )
    }

    /// The block establishing the module context for `path` and pointing
    /// the client at its configuration.
    pub fn bootstrap_block(&self, path: &str) -> String {
        if !self.config.enabled {
            return format!(r#"<script type="application/json" {BOOTSTRAP_MARKER} data-enabled="false"></script>"#);
        }
        let module = self.config.module_extractor.extract(path);
        format!(
            r#"<script type="application/json" {BOOTSTRAP_MARKER} data-module="{}" data-config="{}"></script>"#,
            escape_attr(&module),
            CONFIG_MODULE_PATH
        )
    }

    /// Add the bootstrap block to `source`, right after `<head>` when there
    /// is one and at the very start otherwise.
    pub fn transform(&self, path: &str, source: &str) -> Injection {
        if !self.selects(path) {
            return Injection::Skipped;
        }
        if source.contains(BOOTSTRAP_MARKER) {
            return Injection::Unchanged;
        }

        let block = self.bootstrap_block(path);
        let output = match head_end(source) {
            Some(at) => format!("{}\n{}{}", &source[..at], block, &source[at..]),
            None => format!("{block}\n{source}"),
        };
        trace!(path, "injected console bridge bootstrap");
        Injection::Injected(output)
    }
}

/// Byte offset just past the opening `<head ...>` tag.
fn head_end(source: &str) -> Option<usize> {
    let lower = source.to_ascii_lowercase();
    let mut from = 0;
    while let Some(found) = lower[from..].find("<head") {
        let start = from + found;
        let after = start + "<head".len();
        match lower[after..].chars().next() {
            Some('>') => return Some(after + 1),
            Some(c) if c.is_ascii_whitespace() => {
                return lower[after..].find('>').map(|end| after + end + 1);
            }
            _ => from = after,
        }
    }
    None
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
