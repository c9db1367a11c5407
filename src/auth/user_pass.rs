//! The USERNAME/PASSWORD method (0x02, RFC 1929).

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::reply::{AuthReply, AuthStatus};
use super::request::AuthRequest;
use super::Authenticator;
use crate::error::SocksError;

/// Username/password authenticator backed by a concurrent credential store.
///
/// Lookups run on handshake tasks while [`add`](UserPass::add) and
/// [`del`](UserPass::del) may be called from embedder code at any time.
/// Embedders that need to mutate credentials after registration keep their
/// own `Arc<UserPass>` and register a clone of it:
///
/// ```no_run
/// use std::sync::Arc;
/// use socks5_relay::auth::UserPass;
/// use socks5_relay::{Server, ServerOpts};
///
/// let users = Arc::new(UserPass::new());
/// users.add("alice", "secret");
///
/// let server = Server::new("127.0.0.1:1080", ServerOpts::default());
/// server.add_auth(users.clone());
/// ```
#[derive(Default)]
pub struct UserPass {
    users: RwLock<HashMap<String, String>>,
}

impl UserPass {
    /// Creates an authenticator with an empty credential store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a credential pair.
    pub fn add(&self, user: impl Into<String>, pass: impl Into<String>) {
        if let Ok(mut users) = self.users.write() {
            users.insert(user.into(), pass.into());
        }
    }

    /// Removes a user; in-flight authentications already past lookup are
    /// unaffected.
    pub fn del(&self, user: &str) {
        if let Ok(mut users) = self.users.write() {
            users.remove(user);
        }
    }

    /// Byte-exact credential comparison.
    fn verify(&self, uname: &str, passwd: &str) -> bool {
        self.users
            .read()
            .ok()
            .and_then(|users| users.get(uname).map(|p| p.as_bytes() == passwd.as_bytes()))
            .unwrap_or(false)
    }
}

/// Reads one RFC 1929 sub-negotiation request off the stream.
async fn read_request(stream: &mut TcpStream) -> Result<AuthRequest, SocksError> {
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;

    // UNAME plus the trailing PLEN byte, per the declared ULEN.
    let ulen = head[1] as usize;
    let mut middle = vec![0u8; ulen + 1];
    stream.read_exact(&mut middle).await?;

    let plen = middle[ulen] as usize;
    let mut passwd = vec![0u8; plen];
    stream.read_exact(&mut passwd).await?;

    let mut raw = Vec::with_capacity(2 + middle.len() + passwd.len());
    raw.extend_from_slice(&head);
    raw.extend_from_slice(&middle);
    raw.extend_from_slice(&passwd);
    AuthRequest::try_from(raw.as_slice())
}

#[async_trait]
impl Authenticator for UserPass {
    fn method(&self) -> u8 {
        0x02
    }

    /// Runs the RFC 1929 sub-negotiation. Malformed messages and unknown or
    /// mismatched credentials all fail; the reply `{1,1}` is still written
    /// so the client learns the outcome. A failed reply write downgrades a
    /// pass to a fail.
    async fn check(&self, stream: &mut TcpStream) -> bool {
        let passed = match read_request(stream).await {
            Ok(req) => self.verify(&req.uname, &req.passwd),
            Err(_) => false,
        };

        let status = if passed {
            AuthStatus::Success
        } else {
            AuthStatus::Failure
        };
        let reply = AuthReply::new(status);
        if stream.write_all(&reply.to_bytes()).await.is_err() {
            return false;
        }
        passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_is_byte_exact() {
        let users = UserPass::new();
        users.add("alice", "secret");

        assert!(users.verify("alice", "secret"));
        assert!(!users.verify("alice", "Secret"));
        assert!(!users.verify("alice", "secret "));
        assert!(!users.verify("bob", "secret"));
    }

    #[test]
    fn del_revokes_user() {
        let users = UserPass::new();
        users.add("alice", "secret");
        users.del("alice");
        assert!(!users.verify("alice", "secret"));
    }
}
