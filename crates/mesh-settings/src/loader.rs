//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`MeshSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `MESH_*` environment overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use mesh_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::MeshSettings;

/// Resolve the default settings path (`~/.mesh/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".mesh").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; an unreadable or invalid file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<MeshSettings> {
    load_with(path, |name| std::env::var(name).ok())
}

fn load_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<MeshSettings> {
    let defaults = serde_json::to_value(MeshSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: MeshSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `MESH_*` overrides read through `env`.
///
/// Invalid values are logged and ignored, falling back to file/default:
///
/// | variable                    | field                            |
/// |-----------------------------|----------------------------------|
/// | `MESH_LOG_LEVEL`            | `logging.level`                  |
/// | `MESH_LOG_FORMAT`           | `logging.format` (`compact`/`json`) |
/// | `MESH_WS_PATH`              | `transport.wsPath`               |
/// | `MESH_HANDSHAKE_TIMEOUT_MS` | `transport.handshakeTimeoutMs` (100..=600000) |
/// | `MESH_MAX_MESSAGE_SIZE`     | `transport.maxMessageSize` (1024..=1 GiB) |
pub fn apply_overrides(settings: &mut MeshSettings, env: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| env(name).filter(|v| !v.is_empty());

    if let Some(v) = read("MESH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("MESH_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "MESH_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
    if let Some(v) = read("MESH_WS_PATH") {
        settings.transport.ws_path = v;
    }
    if let Some(v) = read("MESH_HANDSHAKE_TIMEOUT_MS") {
        match parse_u64_range(&v, 100, 600_000) {
            Some(ms) => settings.transport.handshake_timeout_ms = ms,
            None => warn!(key = "MESH_HANDSHAKE_TIMEOUT_MS", value = %v, "invalid u64 env var, ignoring"),
        }
    }
    if let Some(v) = read("MESH_MAX_MESSAGE_SIZE") {
        match parse_usize_range(&v, 1024, 1 << 30) {
            Some(size) => settings.transport.max_message_size = size,
            None => warn!(key = "MESH_MAX_MESSAGE_SIZE", value = %v, "invalid usize env var, ignoring"),
        }
    }
}

/// Parse a log format name (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
