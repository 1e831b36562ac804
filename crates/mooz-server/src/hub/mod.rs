//! Connection hub: client registry, routing, heartbeat and sessions.

pub mod endpoint;
pub mod heartbeat;
pub mod registry;
pub mod router;
pub mod session;
pub mod transport;

pub use endpoint::ClientEndpoint;
pub use heartbeat::{HeartbeatResult, HeartbeatTracker};
pub use registry::ClientRegistry;
pub use router::MessageRouter;
pub use session::{ClientSession, SessionEnd};
pub use transport::{MessageReader, MessageWriter};
