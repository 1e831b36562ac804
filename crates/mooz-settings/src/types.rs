//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may contain any subset of fields. Missing fields keep their
//! compiled default.

use mooz_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Listen address when none is configured and TLS is off.
pub const DEFAULT_PLAIN_BIND_ADDR: &str = "0.0.0.0:8080";
/// Listen address when none is configured and TLS is on.
pub const DEFAULT_TLS_BIND_ADDR: &str = "0.0.0.0:8443";
/// Shortest accepted shutdown drain window, in milliseconds.
pub const MIN_SHUTDOWN_TIMEOUT_MS: u64 = 100;

/// Root settings type.
///
/// ```json
/// {
///   "server": { "bindAddr": "127.0.0.1:9000" },
///   "hub": { "heartbeatIntervalMs": 5000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MoozSettings {
    /// Listener and HTTP surface.
    pub server: ServerSettings,
    /// Connection hub tuning.
    pub hub: HubSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl MoozSettings {
    /// Reject values the hub cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self
            .server
            .bind_addr
            .as_deref()
            .is_some_and(|addr| addr.trim().is_empty())
        {
            return Err(SettingsError::InvalidValue("bind address is empty".into()));
        }
        if self.server.shutdown_timeout_ms < MIN_SHUTDOWN_TIMEOUT_MS {
            return Err(SettingsError::InvalidValue(format!(
                "shutdown timeout must be at least {MIN_SHUTDOWN_TIMEOUT_MS} ms"
            )));
        }
        let tls = &self.server.tls;
        if tls.enabled && (tls.cert_path.trim().is_empty() || tls.key_path.trim().is_empty()) {
            return Err(SettingsError::InvalidValue(
                "TLS needs both a certificate and a key path".into(),
            ));
        }
        if self.hub.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeat interval must be > 0".into(),
            ));
        }
        if self.hub.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "send queue capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Listener and HTTP settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Socket address to listen on. Unset means `:8443` with TLS and
    /// `:8080` without.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<String>,
    /// Directory of static UI assets served for unmatched paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_dir: Option<String>,
    /// How long shutdown waits for sessions to finish, in milliseconds.
    pub shutdown_timeout_ms: u64,
    /// Expose Prometheus metrics at `/metrics`.
    pub metrics_enabled: bool,
    /// Serve HTTPS/WSS instead of plain text.
    pub tls: TlsSettings,
}

impl ServerSettings {
    /// The configured address, or the default for the selected listener.
    pub fn resolved_bind_addr(&self) -> String {
        match &self.bind_addr {
            Some(addr) => addr.clone(),
            None if self.tls.enabled => DEFAULT_TLS_BIND_ADDR.to_string(),
            None => DEFAULT_PLAIN_BIND_ADDR.to_string(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: None,
            assets_dir: None,
            shutdown_timeout_ms: 10_000,
            metrics_enabled: true,
            tls: TlsSettings::default(),
        }
    }
}

/// TLS listener settings. Relative paths resolve against the working
/// directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsSettings {
    /// Terminate TLS in the hub.
    pub enabled: bool,
    /// PEM certificate chain.
    pub cert_path: String,
    /// PEM private key.
    pub key_path: String,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: "cert.pem".to_string(),
            key_path: "key.pem".to_string(),
        }
    }
}

/// Connection hub settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Interval between heartbeat probes, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// A connection with more unacknowledged probes than this is dead.
    pub max_outstanding_probes: usize,
    /// Capacity of each client's outbound queue.
    pub send_queue_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 3_000,
            max_outstanding_probes: 5,
            send_queue_capacity: 256,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
