//! SOCKS5 handshake messages (RFC 1928).
//!
//! This module defines the messages exchanged during the initial
//! client–server handshake:
//!
//! - [`VersionMessage`] → sent by the client to advertise supported
//!   authentication methods.
//! - [`MethodSelection`] → sent by the server to choose one method.
//!
//! These are defined in [RFC 1928, section 3](https://www.rfc-editor.org/rfc/rfc1928#section-3).

use super::method::Method;
use crate::error::SocksError;

/// Client's version/methods message.
///
/// This message is sent by the client immediately after establishing
/// a TCP connection, and lists the authentication methods it supports.
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
///
/// - `VER`: SOCKS version (`0x05`).
/// - `NMETHODS`: number of methods that follow; must be at least 1.
/// - `METHODS`: list of supported authentication methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    /// The SOCKS protocol version (must be `0x05`).
    pub ver: u8,
    /// The list of authentication methods supported by the client.
    pub methods: Vec<Method>,
}

impl VersionMessage {
    /// Creates a new [`VersionMessage`] with the given supported methods.
    pub fn new(methods: Vec<Method>) -> Self {
        Self { ver: 0x05, methods }
    }

    /// Serializes this [`VersionMessage`] into the SOCKS5 wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.methods.len());
        buf.push(self.ver);
        buf.push(self.methods.len() as u8);
        buf.extend(self.methods.iter().map(|m| m.to_u8()));
        buf
    }
}

impl TryFrom<&[u8]> for VersionMessage {
    type Error = SocksError;

    /// Attempts to parse a [`VersionMessage`] from raw bytes.
    ///
    /// Returns an error if:
    /// - the buffer is shorter than 2 bytes
    /// - the version is not `0x05`
    /// - `NMETHODS` is zero
    /// - the buffer does not contain the declared number of methods
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(SocksError::MalformedGreeting);
        }

        let ver = bytes[0];
        if ver != 0x05 {
            return Err(SocksError::UnsupportedVersion(ver));
        }

        let nmethods = bytes[1] as usize;
        if nmethods == 0 {
            return Err(SocksError::MalformedGreeting);
        }
        if bytes.len() < 2 + nmethods {
            return Err(SocksError::TruncatedMessage);
        }

        let methods = bytes[2..2 + nmethods]
            .iter()
            .map(|b| Method::from(*b))
            .collect();

        Ok(Self { ver, methods })
    }
}

/// Server's method selection message.
///
/// This message is sent in response to a [`VersionMessage`],
/// informing the client which authentication method has been chosen.
///
/// ```text
/// +----+--------+
/// |VER | METHOD |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
///
/// - `VER`: SOCKS version (`0x05`).
/// - `METHOD`: one of the methods proposed by the client, or `0xFF`
///   if none are acceptable. After writing `0xFF` the server closes
///   the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSelection {
    /// The SOCKS protocol version (must be `0x05`).
    pub ver: u8,
    /// The authentication method selected by the server.
    pub method: Method,
}

impl MethodSelection {
    /// Creates a new [`MethodSelection`] with the given method.
    pub fn new(method: Method) -> Self {
        Self { ver: 0x05, method }
    }

    /// Serializes this [`MethodSelection`] into a 2-byte array.
    pub fn to_bytes(&self) -> [u8; 2] {
        [self.ver, self.method.to_u8()]
    }
}

impl TryFrom<&[u8]> for MethodSelection {
    type Error = SocksError;

    /// Attempts to parse a [`MethodSelection`] from raw bytes.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(SocksError::TruncatedMessage);
        }

        let ver = bytes[0];
        if ver != 0x05 {
            return Err(SocksError::UnsupportedVersion(ver));
        }

        Ok(Self {
            ver,
            method: Method::from(bytes[1]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::method::FixedMethod;

    #[test]
    fn greeting_round_trips() {
        let wire = [0x05, 0x02, 0x00, 0x02];
        let msg = VersionMessage::try_from(&wire[..]).unwrap();
        assert_eq!(
            msg.methods,
            vec![
                Method::Fixed(FixedMethod::NoAuth),
                Method::Fixed(FixedMethod::UsePass)
            ]
        );
        assert_eq!(msg.to_bytes(), wire);
    }

    #[test]
    fn greeting_builder_speaks_version_five() {
        let msg = VersionMessage::new(vec![Method::Fixed(FixedMethod::NoAuth)]);
        assert_eq!(msg.to_bytes(), [0x05, 0x01, 0x00]);
    }

    #[test]
    fn greeting_rejects_wrong_version() {
        assert!(matches!(
            VersionMessage::try_from(&[0x04, 0x01, 0x00][..]),
            Err(SocksError::UnsupportedVersion(0x04))
        ));
    }

    #[test]
    fn greeting_rejects_zero_methods() {
        assert!(matches!(
            VersionMessage::try_from(&[0x05, 0x00][..]),
            Err(SocksError::MalformedGreeting)
        ));
    }

    #[test]
    fn greeting_rejects_missing_methods() {
        assert!(matches!(
            VersionMessage::try_from(&[0x05, 0x03, 0x00][..]),
            Err(SocksError::TruncatedMessage)
        ));
    }

    #[test]
    fn selection_round_trips() {
        let sel = MethodSelection::new(Method::Fixed(FixedMethod::NoAcceptable));
        assert_eq!(sel.to_bytes(), [0x05, 0xFF]);
        let parsed = MethodSelection::try_from(&sel.to_bytes()[..]).unwrap();
        assert_eq!(parsed, sel);
    }
}
