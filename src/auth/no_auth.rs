//! The NO AUTHENTICATION REQUIRED method (0x00).

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::Authenticator;

/// Accepts every client without exchanging any bytes.
pub struct NoAuth;

#[async_trait]
impl Authenticator for NoAuth {
    fn method(&self) -> u8 {
        0x00
    }

    async fn check(&self, _stream: &mut TcpStream) -> bool {
        true
    }
}
