//! # mooz-server
//!
//! Axum HTTP + `WebSocket` relay hub.
//!
//! - `WebSocket` gateway at `/ws`: every connection becomes a session with a
//!   fresh client id
//! - Addressed relay between clients, plus `joined`/`left` presence
//!   announcements
//! - Application-level heartbeat (`ping`/`pong` messages) that drops
//!   unresponsive clients
//! - HTTP endpoints: health check, Prometheus metrics, static UI assets
//! - Plain-text or TLS listener, chosen at startup
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod assets;
pub mod config;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod tls;

pub use config::{HubConfig, ServerConfig, TlsConfig};
pub use server::{HubServer, ServerHandle};
