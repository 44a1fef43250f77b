pub mod connection;
pub mod handshake;
pub mod registry;
pub mod relay;

pub use registry::{Connection, ConnectionId, PresenceTransition, Registry};
pub use relay::Relay;
