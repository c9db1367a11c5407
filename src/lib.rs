//! An asynchronous SOCKS5 proxy server library built on Tokio.
//!
//! This crate implements the server side of the SOCKS5 protocol
//! (RFC 1928) with optional username/password authentication (RFC 1929),
//! supporting the TCP `CONNECT` and `UDP ASSOCIATE` commands. `BIND` is
//! answered with "command not supported".
//!
//! The server deliberately does not dial anywhere. Every request that
//! survives negotiation, authentication, and parsing is queued for the
//! embedding application, which decides how to reach the destination and
//! answers with [`Request::success`] (handing over an upstream
//! [`TcpStream`](tokio::net::TcpStream) or
//! [`UdpSocket`](tokio::net::UdpSocket)) or [`Request::fail`]. This keeps
//! routing policy, dial timeouts, and upstream choice entirely in the
//! embedder's hands while the library runs the handshakes and relays.
//!
//! ```no_run
//! use std::sync::Arc;
//! use socks5_relay::auth::NoAuth;
//! use socks5_relay::{Approval, Server, ServerOpts, SocksError};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SocksError> {
//!     let server = Server::new("127.0.0.1:1080", ServerOpts::default());
//!     server.add_auth(Arc::new(NoAuth));
//!     server.listen().await?;
//!
//!     while let Some(req) = server.accept_request().await {
//!         tokio::spawn(async move {
//!             let host = req.dst();
//!             match TcpStream::connect((host.as_str(), req.dst_port())).await {
//!                 Ok(upstream) => req.success(Approval::Stream(upstream)).await,
//!                 Err(e) => req.fail(e.into()).await,
//!             }
//!         });
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

pub mod auth;
pub mod conn;
pub mod error;
pub mod msg;
pub mod parse;
pub mod relay;
pub mod request;
pub mod server;

mod handshake;

pub use conn::reply::Rep;
pub use conn::request::CMD;
pub use error::SocksError;
pub use parse::AddrPort;
pub use request::{Approval, Request};
pub use server::{Server, ServerOpts};

/// Represents the address type in SOCKS5 messages.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ATYP {
    /// IPv4 address
    V4 = 0x01,
    /// Domain name
    DomainName = 0x03,
    /// IPv6 address
    V6 = 0x04,
}

impl fmt::Display for ATYP {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ATYP::V4 => write!(f, "IPv4"),
            ATYP::V6 => write!(f, "IPv6"),
            ATYP::DomainName => write!(f, "Domain"),
        }
    }
}
