//! Connection request and reply messages (RFC 1928 §4–6).

pub mod reply;
pub mod request;

pub use reply::{ConnReply, Rep};
pub use request::{CMD, ConnRequest};
