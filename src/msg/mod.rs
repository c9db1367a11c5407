//! Handshake messages for the negotiation phase (RFC 1928 §3).

pub mod message;
pub mod method;

pub use message::{MethodSelection, VersionMessage};
pub use method::{FixedMethod, Method};
