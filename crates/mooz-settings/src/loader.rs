//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`MoozSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{MIN_SHUTDOWN_TIMEOUT_MS, MoozSettings};

/// Resolve the default settings file path (`~/.mooz/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".mooz").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<MoozSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file means defaults; an unreadable or invalid file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<MoozSettings> {
    let defaults = serde_json::to_value(MoozSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: MoozSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
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

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut MoozSettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Values are strictly parsed and range-checked; invalid values are ignored
/// with a warning, leaving the file/default value in place. The legacy
/// `BIND_ADDR` and `USE_TLS` names are honored when their `MOOZ_` forms are
/// unset.
pub fn apply_overrides_with<F>(settings: &mut MoozSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env
        .string("MOOZ_BIND_ADDR")
        .or_else(|| env.string("BIND_ADDR"))
    {
        settings.server.bind_addr = Some(v);
    }
    if let Some(v) = env.string("MOOZ_ASSETS_DIR") {
        settings.server.assets_dir = Some(v);
    }
    if let Some(v) = env.u64("MOOZ_SHUTDOWN_TIMEOUT_MS", MIN_SHUTDOWN_TIMEOUT_MS, 600_000) {
        settings.server.shutdown_timeout_ms = v;
    }
    if let Some(v) = env.bool("MOOZ_METRICS_ENABLED") {
        settings.server.metrics_enabled = v;
    }

    if let Some(v) = env.bool("MOOZ_USE_TLS").or_else(|| env.bool("USE_TLS")) {
        settings.server.tls.enabled = v;
    }
    if let Some(v) = env.string("MOOZ_TLS_CERT_PATH") {
        settings.server.tls.cert_path = v;
    }
    if let Some(v) = env.string("MOOZ_TLS_KEY_PATH") {
        settings.server.tls.key_path = v;
    }

    // ── Hub ─────────────────────────────────────────────────────────
    if let Some(v) = env.u64("MOOZ_HEARTBEAT_INTERVAL_MS", 10, 600_000) {
        settings.hub.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.usize("MOOZ_MAX_OUTSTANDING_PROBES", 1, 1_000) {
        settings.hub.max_outstanding_probes = v;
    }
    if let Some(v) = env.usize("MOOZ_SEND_QUEUE_CAPACITY", 1, 1_000_000) {
        settings.hub.send_queue_capacity = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("MOOZ_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("MOOZ_LOG_FORMAT") {
        match serde_json::from_value(Value::String(v.to_lowercase())) {
            Ok(format) => settings.logging.format = format,
            Err(_) => warn!(key = "MOOZ_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}
