//! # mooz-core
//!
//! Shared vocabulary for the mooz relay hub.
//!
//! - **Client ids**: [`ClientId`] newtype, unique per connection lifetime
//! - **Messages**: the [`Message`] envelope exchanged over every connection,
//!   with the reserved [`MessageType`] vocabulary
//! - **Errors**: [`TransportError`] and [`ProtocolError`] via `thiserror`
//! - **Logging**: `tracing` subscriber setup for binaries

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod message;

pub use errors::{ProtocolError, TransportError};
pub use ids::ClientId;
pub use message::{Message, MessageType};
