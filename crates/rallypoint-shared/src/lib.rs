//! Shared types for Rallypoint: wire protocol, domain types, constants,
//! and the error taxonomy used across the core crates.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::Payload;
pub use types::{DeliveryStatus, Message, PeerId, PeerRole, Role, Scope};
