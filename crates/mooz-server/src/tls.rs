//! HTTPS/WSS listener.
//!
//! The router is the same one the plain listener serves; only the accept
//! loop differs.

use std::io;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::TlsConfig;

/// Load the PEM certificate chain and key named by `tls`.
pub async fn load(tls: &TlsConfig) -> io::Result<RustlsConfig> {
    // ring is the only rustls provider compiled in.
    let _ = rustls::crypto::ring::default_provider().install_default();
    RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| {
            io::Error::new(
                e.kind(),
                format!(
                    "loading TLS certificate {} and key {}: {e}",
                    tls.cert_path.display(),
                    tls.key_path.display()
                ),
            )
        })
}

/// Serve `app` over TLS on a bound listener until `token` is cancelled.
pub async fn serve(
    listener: std::net::TcpListener,
    config: RustlsConfig,
    app: Router,
    token: CancellationToken,
) -> io::Result<()> {
    let handle = axum_server::Handle::new();
    let stopper = handle.clone();
    let _ = tokio::spawn(async move {
        token.cancelled().await;
        debug!("stopping TLS listener");
        stopper.graceful_shutdown(None);
    });

    axum_server::from_tcp_rustls(listener, config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
}
