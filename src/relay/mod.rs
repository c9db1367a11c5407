//! Relay engines for approved requests.
//!
//! [`tcp`] pumps bytes between the client and an upstream stream for
//! CONNECT; [`udp`] runs the datagram relay session for UDP ASSOCIATE,
//! framed per [`datagram::UdpHeader`].

pub mod datagram;
pub(crate) mod pool;
pub(crate) mod tcp;
pub(crate) mod udp;

pub use datagram::UdpHeader;
