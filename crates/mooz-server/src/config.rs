//! Runtime configuration for the hub server.

use std::path::PathBuf;
use std::time::Duration;

use mooz_settings::MoozSettings;

/// Per-session hub tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Interval between heartbeat probes.
    pub heartbeat_interval: Duration,
    /// More unanswered probes than this and the client is dropped.
    pub max_outstanding_probes: usize,
    /// Capacity of each client's outbound queue.
    pub send_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(3),
            max_outstanding_probes: 5,
            send_queue_capacity: 256,
        }
    }
}

/// Certificate and key for the TLS listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM certificate chain.
    pub cert_path: PathBuf,
    /// PEM private key.
    pub key_path: PathBuf,
}

/// Configuration for the hub server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Socket address to bind. `":8080"` is accepted as shorthand for all
    /// interfaces.
    pub bind_addr: String,
    /// Static UI directory served for unmatched paths.
    pub assets_dir: Option<PathBuf>,
    /// How long shutdown waits for sessions to drain.
    pub shutdown_timeout: Duration,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Session tuning.
    pub hub: HubConfig,
    /// Serve HTTPS/WSS with this certificate instead of plain text.
    pub tls: Option<TlsConfig>,
}

impl ServerConfig {
    /// Bind address with a bare `:port` expanded to `0.0.0.0:port`.
    pub fn normalized_bind_addr(&self) -> String {
        normalize_bind_addr(&self.bind_addr)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            assets_dir: None,
            shutdown_timeout: Duration::from_secs(10),
            max_message_size: 1024 * 1024, // 1 MB
            hub: HubConfig::default(),
            tls: None,
        }
    }
}

impl From<&MoozSettings> for ServerConfig {
    fn from(settings: &MoozSettings) -> Self {
        Self {
            bind_addr: settings.server.resolved_bind_addr(),
            assets_dir: settings.server.assets_dir.as_ref().map(PathBuf::from),
            shutdown_timeout: Duration::from_millis(settings.server.shutdown_timeout_ms),
            hub: HubConfig {
                heartbeat_interval: Duration::from_millis(settings.hub.heartbeat_interval_ms),
                max_outstanding_probes: settings.hub.max_outstanding_probes,
                send_queue_capacity: settings.hub.send_queue_capacity,
            },
            tls: settings.server.tls.enabled.then(|| TlsConfig {
                cert_path: PathBuf::from(&settings.server.tls.cert_path),
                key_path: PathBuf::from(&settings.server.tls.key_path),
            }),
            ..Self::default()
        }
    }
}

fn normalize_bind_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}
