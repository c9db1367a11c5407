//! Demo server: answers CONNECT by dialing the destination directly and
//! UDP ASSOCIATE by binding a fresh packet socket.

use std::sync::Arc;
use std::time::Duration;

use socks5_relay::auth::NoAuth;
use socks5_relay::{Approval, CMD, Server, ServerOpts, SocksError};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{Instant, timeout};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), SocksError> {
    tracing_subscriber::fmt::init();

    let server = Server::new(
        "127.0.0.1:1080",
        ServerOpts {
            allow_udp: true,
            ..Default::default()
        },
    );
    server.add_auth(Arc::new(NoAuth));
    server.listen().await?;

    while let Some(req) = server.accept_request().await {
        tokio::spawn(async move {
            let host = req.dst();
            let port = req.dst_port();
            match req.cmd() {
                CMD::Connect => {
                    let started = Instant::now();
                    match timeout(
                        Duration::from_secs(10),
                        TcpStream::connect((host.as_str(), port)),
                    )
                    .await
                    {
                        Ok(Ok(upstream)) => {
                            info!(dst = %format!("{host}:{port}"), elapsed = ?started.elapsed(), "dialed");
                            req.success(Approval::Stream(upstream)).await;
                        }
                        Ok(Err(e)) => {
                            warn!(dst = %format!("{host}:{port}"), error = %e, "dial failed");
                            req.fail(e.into()).await;
                        }
                        Err(_) => {
                            warn!(dst = %format!("{host}:{port}"), "dial timed out");
                            req.fail(std::io::Error::from(std::io::ErrorKind::TimedOut).into())
                                .await;
                        }
                    }
                }
                CMD::UdpAssociate => match UdpSocket::bind("0.0.0.0:0").await {
                    Ok(socket) => req.success(Approval::Packet(socket)).await,
                    Err(e) => req.fail(e.into()).await,
                },
                CMD::Bind => req.fail(SocksError::UnsupportedCommand(CMD::Bind as u8)).await,
            }
        });
    }
    Ok(())
}
