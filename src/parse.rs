//! SOCKS5 address and port parsing utilities.
//!
//! This module defines [`AddrPort`], the shared representation of an address
//! and port (IPv4, IPv6, or domain) used by request headers, reply headers,
//! and the UDP encapsulation header, plus [`Parse`], a helper for decoding
//! such addresses from raw SOCKS5 protocol bytes.
//!
//! The address formats are defined in
//! [RFC 1928 §5, "Addressing"](<https://www.rfc-editor.org/rfc/rfc1928#section-5>).

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::ATYP;

/// Represents a destination address and port.
///
/// SOCKS5 requests and replies contain an address field that may be:
/// - An IPv4 address (`ATYP = 0x01`).
/// - An IPv6 address (`ATYP = 0x04`).
/// - A domain name (`ATYP = 0x03`), which is represented here as [`AddrPort::Domain`].
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum AddrPort {
    /// An IPv4 address and port.
    V4(Ipv4Addr, u16),

    /// An IPv6 address and port.
    V6(Ipv6Addr, u16),

    /// A domain name and port.
    Domain(String, u16),
}

impl AddrPort {
    /// Returns the `ATYP` byte describing this address.
    pub fn atyp(&self) -> ATYP {
        match self {
            AddrPort::V4(_, _) => ATYP::V4,
            AddrPort::V6(_, _) => ATYP::V6,
            AddrPort::Domain(_, _) => ATYP::DomainName,
        }
    }

    /// Returns the host part without the port, e.g. `"203.0.113.7"` or
    /// `"example.com"`.
    pub fn host(&self) -> String {
        match self {
            AddrPort::V4(ip, _) => ip.to_string(),
            AddrPort::V6(ip, _) => ip.to_string(),
            AddrPort::Domain(name, _) => name.clone(),
        }
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        match self {
            AddrPort::V4(_, port) | AddrPort::V6(_, port) | AddrPort::Domain(_, port) => *port,
        }
    }

    /// Appends the wire form of `ADDR | PORT` to `buf`.
    ///
    /// Domain names are length-prefixed with a single octet; the length byte
    /// is trusted as-is, so names longer than 255 bytes are truncated by the
    /// cast and must be rejected by callers beforehand.
    pub(crate) fn write_bytes(&self, buf: &mut Vec<u8>) {
        match self {
            AddrPort::V4(addr, port) => {
                buf.extend_from_slice(&addr.octets());
                buf.extend_from_slice(&port.to_be_bytes());
            }
            AddrPort::V6(addr, port) => {
                buf.extend_from_slice(&addr.octets());
                buf.extend_from_slice(&port.to_be_bytes());
            }
            AddrPort::Domain(name, port) => {
                buf.push(name.len() as u8);
                buf.extend_from_slice(name.as_bytes());
                buf.extend_from_slice(&port.to_be_bytes());
            }
        }
    }
}

impl From<SocketAddr> for AddrPort {
    /// Converts a socket address, normalizing IPv4-mapped IPv6 addresses to
    /// their 4-byte form as required for reply headers.
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => AddrPort::V4(*v4.ip(), v4.port()),
            SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
                Some(ip) => AddrPort::V4(ip, v6.port()),
                None => AddrPort::V6(*v6.ip(), v6.port()),
            },
        }
    }
}

impl fmt::Display for AddrPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrPort::V4(ip, port) => write!(f, "{}:{}", ip, port),
            AddrPort::V6(ip, port) => write!(f, "[{}]:{}", ip, port),
            AddrPort::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

/// Provides parsing utilities for extracting addresses from raw bytes.
pub struct Parse;

impl Parse {
    /// Parses an IP address and port from a byte slice.
    ///
    /// # Arguments
    ///
    /// * `buf` - The byte slice containing the raw address data.
    /// * `atyp` - The address type byte (`ATYP`) as defined by RFC 1928:
    ///   - `0x01`: IPv4 address (4 bytes) + port (2 bytes).
    ///   - `0x04`: IPv6 address (16 bytes) + port (2 bytes).
    ///
    /// # Returns
    ///
    /// Returns `Some((AddrPort, used_bytes))` on success, where `used_bytes` is the
    /// number of bytes consumed. Returns `None` if the buffer is too short or if
    /// the `atyp` is unsupported (domain names are length-prefixed and handled
    /// by the individual message decoders).
    pub fn parse_ip_port(buf: &[u8], atyp: u8) -> Option<(AddrPort, usize)> {
        match atyp {
            0x01 => {
                if buf.len() < 6 {
                    return None;
                }
                let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
                let port = u16::from_be_bytes([buf[4], buf[5]]);
                Some((AddrPort::V4(ip, port), 6))
            }
            0x04 => {
                if buf.len() < 18 {
                    return None;
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[..16]);
                let port = u16::from_be_bytes([buf[16], buf[17]]);
                Some((AddrPort::V6(Ipv6Addr::from(octets), port), 18))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4() {
        let buf = [127, 0, 0, 1, 0x1F, 0x90];
        let (addr, used) = Parse::parse_ip_port(&buf, 0x01).unwrap();
        assert_eq!(addr, AddrPort::V4(Ipv4Addr::LOCALHOST, 8080));
        assert_eq!(used, 6);
    }

    #[test]
    fn parses_ipv6() {
        let mut buf = [0u8; 18];
        buf[15] = 1;
        buf[17] = 80;
        let (addr, used) = Parse::parse_ip_port(&buf, 0x04).unwrap();
        assert_eq!(addr, AddrPort::V6(Ipv6Addr::LOCALHOST, 80));
        assert_eq!(used, 18);
    }

    #[test]
    fn short_buffers_rejected() {
        assert!(Parse::parse_ip_port(&[1, 2, 3], 0x01).is_none());
        assert!(Parse::parse_ip_port(&[0u8; 17], 0x04).is_none());
    }

    #[test]
    fn socket_addr_conversion_unmaps_v4_in_v6() {
        let mapped: SocketAddr = "[::ffff:192.0.2.1]:443".parse().unwrap();
        assert_eq!(
            AddrPort::from(mapped),
            AddrPort::V4("192.0.2.1".parse().unwrap(), 443)
        );

        let plain: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        assert_eq!(AddrPort::from(plain).atyp(), ATYP::V6);
    }

    #[test]
    fn displays_host_and_port() {
        let v6 = AddrPort::V6(Ipv6Addr::LOCALHOST, 9);
        assert_eq!(v6.to_string(), "[::1]:9");
        let dom = AddrPort::Domain("example.com".into(), 80);
        assert_eq!(dom.to_string(), "example.com:80");
        assert_eq!(dom.host(), "example.com");
    }
}
