//! Pluggable authentication for the negotiation phase.
//!
//! An [`Authenticator`] pairs a method byte with a check routine that runs
//! immediately after the server has replied with `{VERSION, method}`. The
//! check may read and write on the client stream as dictated by that
//! method's sub-negotiation.
//!
//! Built-ins cover the two methods the server supports out of the box:
//! [`NoAuth`] (0x00) and [`UserPass`] (0x02, RFC 1929). Embedders may
//! register authenticators for any other method byte.

pub mod no_auth;
pub mod reply;
pub mod request;
pub mod user_pass;

pub use no_auth::NoAuth;
pub use reply::{AuthReply, AuthStatus};
pub use request::AuthRequest;
pub use user_pass::UserPass;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::net::TcpStream;

/// A per-method authentication check.
///
/// `check` runs with the handshake deadline applied by the caller and
/// returns `true` when the client may proceed to the request phase.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// The method byte this authenticator negotiates (RFC 1928 §3).
    fn method(&self) -> u8;

    /// Runs the method's sub-negotiation on the client stream.
    async fn check(&self, stream: &mut TcpStream) -> bool;
}

/// Table of registered authenticators, indexed by method byte.
///
/// Handshake tasks read concurrently; the embedder mutates rarely. Lookups
/// clone the `Arc` out so no lock is held across the sub-negotiation I/O.
#[derive(Clone)]
pub(crate) struct AuthRegistry {
    slots: Arc<RwLock<[Option<Arc<dyn Authenticator>>; 256]>>,
}

impl AuthRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: Arc::new(RwLock::new(std::array::from_fn(|_| None))),
        }
    }

    /// Registers `auth` under its own method byte, replacing any previous
    /// authenticator for that method.
    pub(crate) fn set(&self, auth: Arc<dyn Authenticator>) {
        let method = auth.method() as usize;
        if let Ok(mut slots) = self.slots.write() {
            slots[method] = Some(auth);
        }
    }

    pub(crate) fn remove(&self, method: u8) {
        if let Ok(mut slots) = self.slots.write() {
            slots[method as usize] = None;
        }
    }

    pub(crate) fn get(&self, method: u8) -> Option<Arc<dyn Authenticator>> {
        self.slots
            .read()
            .ok()
            .and_then(|slots| slots[method as usize].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_set_get_remove() {
        let reg = AuthRegistry::new();
        assert!(reg.get(0x00).is_none());

        reg.set(Arc::new(NoAuth));
        assert_eq!(reg.get(0x00).unwrap().method(), 0x00);

        reg.remove(0x00);
        assert!(reg.get(0x00).is_none());
    }
}
