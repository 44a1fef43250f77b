//! Client-side state for a Parley chat session: typing debounce, optimistic
//! sends, reaction aggregation, and the transports that feed them.

pub mod config;
pub mod error;
pub mod http;
pub mod reactions;
pub mod session;
pub mod subscriptions;
pub mod timeline;
pub mod transport;
pub mod typing;

pub use config::ClientConfig;
pub use error::ClientError;
pub use session::{ChatSession, SessionNotice};
