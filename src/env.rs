//! Environment variable names used to override [`BridgeConfig`] without a
//! config file.
//!
//! These are purely helpers; the config type itself stays decoupled from
//! environment access.

use crate::config::BridgeConfig;
use crate::error::ConfigError;
use crate::record::LogLevel;

/// Master switch, `true`/`false`/`1`/`0`.
pub const CONSOLE_BRIDGE_ENABLED_ENV: &str = "CONSOLE_BRIDGE_ENABLED";

/// Ingestion path, e.g. `/api/debug/client-logs`.
pub const CONSOLE_BRIDGE_ENDPOINT_ENV: &str = "CONSOLE_BRIDGE_ENDPOINT";

/// Comma-separated forwarded levels, e.g. `error,warn`.
pub const CONSOLE_BRIDGE_LEVELS_ENV: &str = "CONSOLE_BRIDGE_LEVELS";

/// Comma-separated include globs.
pub const CONSOLE_BRIDGE_INCLUDE_ENV: &str = "CONSOLE_BRIDGE_INCLUDE";

/// Comma-separated exclude globs.
pub const CONSOLE_BRIDGE_EXCLUDE_ENV: &str = "CONSOLE_BRIDGE_EXCLUDE";

pub const CONSOLE_BRIDGE_SILENT_ON_ERROR_ENV: &str = "CONSOLE_BRIDGE_SILENT_ON_ERROR";

pub const CONSOLE_BRIDGE_FORWARD_ERRORS_ENV: &str = "CONSOLE_BRIDGE_FORWARD_ERRORS";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Apply overrides from the process environment.
pub fn apply_env(config: BridgeConfig) -> Result<BridgeConfig, ConfigError> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply overrides from an arbitrary lookup.
pub fn apply_overrides(
    mut config: BridgeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<BridgeConfig, ConfigError> {
    if let Some(v) = lookup(CONSOLE_BRIDGE_ENABLED_ENV) {
        config.enabled = parse_bool("enabled", &v)?;
    }
    if let Some(v) = lookup(CONSOLE_BRIDGE_ENDPOINT_ENV) {
        config.endpoint = v;
    }
    if let Some(v) = lookup(CONSOLE_BRIDGE_LEVELS_ENV) {
        config.levels = split_list(&v)
            .map(|s| {
                s.parse::<LogLevel>().map_err(|_| ConfigError::InvalidValue {
                    key: "levels",
                    value: s.to_string(),
                })
            })
            .collect::<Result<_, _>>()?;
    }
    if let Some(v) = lookup(CONSOLE_BRIDGE_INCLUDE_ENV) {
        config.include_patterns = split_list(&v).map(str::to_string).collect();
    }
    if let Some(v) = lookup(CONSOLE_BRIDGE_EXCLUDE_ENV) {
        config.exclude_patterns = split_list(&v).map(str::to_string).collect();
    }
    if let Some(v) = lookup(CONSOLE_BRIDGE_SILENT_ON_ERROR_ENV) {
        config.silent_on_error = parse_bool("silentOnError", &v)?;
    }
    if let Some(v) = lookup(CONSOLE_BRIDGE_FORWARD_ERRORS_ENV) {
        config.forward_errors = parse_bool("forwardErrors", &v)?;
    }
    Ok(config)
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn overrides_replace_defaults() {
        let config = apply_overrides(
            BridgeConfig::default(),
            lookup(&[
                (CONSOLE_BRIDGE_LEVELS_ENV, "error, warn"),
                (CONSOLE_BRIDGE_ENDPOINT_ENV, "/logs"),
                (CONSOLE_BRIDGE_SILENT_ON_ERROR_ENV, "off"),
                (CONSOLE_BRIDGE_EXCLUDE_ENV, "**/vendor/**,**/node_modules/**"),
            ]),
        )
        .unwrap();
        assert_eq!(config.endpoint, "/logs");
        assert_eq!(config.levels.len(), 2);
        assert!(!config.silent_on_error);
        assert_eq!(config.exclude_patterns.len(), 2);
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = apply_overrides(
            BridgeConfig::default(),
            lookup(&[(CONSOLE_BRIDGE_LEVELS_ENV, "error,verbose")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "levels", .. }));

        let err = apply_overrides(
            BridgeConfig::default(),
            lookup(&[(CONSOLE_BRIDGE_ENABLED_ENV, "maybe")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "enabled", .. }));
    }

    #[test]
    fn empty_environment_changes_nothing() {
        let config = apply_overrides(BridgeConfig::default(), |_| None).unwrap();
        assert!(config.enabled);
        assert_eq!(config.levels.len(), 5);
    }
}
