//! SOCKS5 error definitions.
//!
//! This module defines [`SocksError`], the unified error type used across the
//! SOCKS5 implementation. Errors are grouped by protocol phase:
//! - **Version / Method Selection** (RFC 1928 §3).
//! - **Authentication** (RFC 1929).
//! - **Connection requests and replies** (RFC 1928 §4–6).
//! - **Dispatch and relay**: the embedder-facing request queue and the
//!   TCP/UDP relay engines.
//! - **General I/O errors** from the underlying transport.
//!
//! Per-connection errors never take the server down: they close the offending
//! connection and are forwarded to the configured error sink.

use thiserror::Error;

/// Represents all possible errors that can occur while running the SOCKS5 server.
#[derive(Debug, Error)]
pub enum SocksError {
    // ===== Version / Method Selection =====
    /// The client requested an unsupported SOCKS protocol version.
    #[error("unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// The client's greeting was too short or advertised zero methods.
    #[error("malformed greeting")]
    MalformedGreeting,

    /// None of the client's methods has a registered authenticator.
    #[error("no acceptable authentication method")]
    NoAcceptableMethod,

    // ===== Authentication =====
    /// The client used an unsupported sub-negotiation version.
    #[error("authentication version not supported: {0}")]
    UnsupportedAuthVersion(u8),

    /// The client's authentication attempt failed with a reason.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    // ===== Request / Reply =====
    /// A message was truncated before its declared end.
    #[error("truncated message")]
    TruncatedMessage,

    /// The client specified an invalid or unsupported address type.
    #[error("invalid address type: {0}")]
    InvalidAddressType(u8),

    /// A reply carried an unknown REP code.
    #[error("invalid reply code: {0}")]
    InvalidReplyCode(u8),

    /// The client provided an invalid or malformed domain name.
    #[error("invalid domain name")]
    InvalidDomain,

    /// The client requested BIND or an unknown command.
    #[error("unsupported command: {0}")]
    UnsupportedCommand(u8),

    /// The client requested UDP ASSOCIATE while UDP relaying is disabled.
    #[error("UDP association not allowed")]
    UdpDisabled,

    /// A UDP-encapsulated datagram violated the RFC 1928 §7 header format.
    #[error("malformed UDP datagram")]
    InvalidDatagram,

    // ===== Dispatch =====
    /// The embedder approved a request with the wrong upstream kind.
    #[error("approval does not match requested command: {0}")]
    ApprovalMismatch(String),

    /// The request queue was full or closed when a handshake completed.
    #[error("request queue full or closed")]
    QueueFull,

    // ===== Lifecycle =====
    /// The handshake did not complete within the configured deadline.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// `listen` was called on a server that is already listening.
    #[error("server already listening")]
    AlreadyListening,

    /// `listen` was called on a server that has been stopped.
    #[error("server stopped")]
    Stopped,

    // ===== General =====
    /// A general I/O error occurred in the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
