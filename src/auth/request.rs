//! Authentication request message for SOCKS5 username/password authentication.
//!
//! Defined in [RFC 1929, section 2](https://www.rfc-editor.org/rfc/rfc1929#section-2).
//!
//! After selecting username/password authentication during method negotiation
//! ([RFC 1928, section 3](https://www.rfc-editor.org/rfc/rfc1928#section-3)),
//! the client sends a request of the form:
//!
//! ```text
//! +----+------+----------+------+----------+
//! |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
//! +----+------+----------+------+----------+
//! |  1 |  1   | 1–255    |  1   | 1–255    |
//! +----+------+----------+------+----------+
//!
//! o VER     - subnegotiation version (always 0x01)
//! o ULEN    - length of username in bytes
//! o UNAME   - username (1–255 bytes)
//! o PLEN    - length of password in bytes
//! o PASSWD  - password (1–255 bytes)
//! ```
//!
//! `ULEN` and `PLEN` are both at least 1 in any accepted request; a zero
//! length fails to decode and therefore fails the authentication.

use crate::error::SocksError;

/// Represents an authentication request from a client (RFC 1929 §2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Authentication protocol version (`VER`), always `0x01`.
    pub ver: u8,
    /// The username (`UNAME`).
    pub uname: String,
    /// The password (`PASSWD`).
    pub passwd: String,
}

impl AuthRequest {
    /// Creates a new `AuthRequest`.
    pub fn new(uname: String, passwd: String) -> Self {
        Self {
            ver: 0x01,
            uname,
            passwd,
        }
    }

    /// Serializes the request into the RFC 1929 wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 + self.uname.len() + self.passwd.len());
        buf.push(self.ver);
        buf.push(self.uname.len() as u8);
        buf.extend_from_slice(self.uname.as_bytes());
        buf.push(self.passwd.len() as u8);
        buf.extend_from_slice(self.passwd.as_bytes());
        buf
    }
}

impl TryFrom<&[u8]> for AuthRequest {
    type Error = SocksError;

    /// Parses an authentication request from raw bytes.
    ///
    /// # Errors
    /// - [`SocksError::TruncatedMessage`] if the message is shorter than 2 bytes.
    /// - [`SocksError::UnsupportedAuthVersion`] if `VER != 0x01`.
    /// - [`SocksError::AuthFailed`] if a length field is zero, the buffer is
    ///   truncated before a declared field, or the username or password are
    ///   not valid UTF-8.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(SocksError::TruncatedMessage);
        }

        let ver = bytes[0];
        if ver != 0x01 {
            return Err(SocksError::UnsupportedAuthVersion(ver));
        }

        let ulen = bytes[1] as usize;
        if ulen == 0 {
            return Err(SocksError::AuthFailed("empty username".into()));
        }
        if bytes.len() < 2 + ulen + 1 {
            return Err(SocksError::AuthFailed("truncated before username".into()));
        }

        let uname = String::from_utf8(bytes[2..2 + ulen].to_vec())
            .map_err(|_| SocksError::AuthFailed("invalid UTF-8 in username".into()))?;

        let plen_index = 2 + ulen;
        let plen = bytes[plen_index] as usize;
        if plen == 0 {
            return Err(SocksError::AuthFailed("empty password".into()));
        }
        if bytes.len() < plen_index + 1 + plen {
            return Err(SocksError::AuthFailed("truncated before password".into()));
        }

        let passwd = String::from_utf8(bytes[plen_index + 1..plen_index + 1 + plen].to_vec())
            .map_err(|_| SocksError::AuthFailed("invalid UTF-8 in password".into()))?;

        Ok(Self { ver, uname, passwd })
    }
}
