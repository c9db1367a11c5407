//! UDP relay session for approved ASSOCIATE requests.
//!
//! The session binds a local packet socket next to the TCP listener, tells
//! the client where it is via the success reply, and then forwards datagrams
//! both ways, encapsulating per [`UdpHeader`]. Its lifetime is bound to the
//! TCP control connection: a control channel is not expected to carry data,
//! so the first read completion of any kind tears the session down.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::datagram::UdpHeader;
use super::pool;
use crate::conn::reply::{ConnReply, Rep};
use crate::error::SocksError;
use crate::parse::AddrPort;

/// State for one ASSOCIATE request, built by the dispatch bridge after the
/// embedder supplied the upstream packet socket.
pub(crate) struct UdpSession {
    /// The TCP connection the request arrived on.
    pub control: TcpStream,
    /// Remote endpoint of `control`; only this IP may use the relay.
    pub client_addr: SocketAddr,
    /// Embedder-supplied socket for talking to real destinations.
    pub upstream: UdpSocket,
    /// IP the local packet socket binds on (the server's bind interface).
    pub bind_ip: IpAddr,
    /// Optional BND.ADDR substitute for the success reply.
    pub rewrite_bnd: Option<IpAddr>,
    /// Handshake deadline; applies up to and including the success reply.
    pub deadline: Instant,
    pub cancel: CancellationToken,
    pub errs: mpsc::Sender<SocksError>,
}

impl UdpSession {
    /// Binds the relay socket, replies to the client, and starts the
    /// control watcher plus both pumps. Bind failure replies REP=1 and
    /// closes the control connection.
    pub(crate) async fn run(mut self) {
        let local = match UdpSocket::bind((self.bind_ip, 0)).await {
            Ok(s) => s,
            Err(e) => return self.abort(e.into()).await,
        };
        let mut bnd = match local.local_addr() {
            Ok(a) => a,
            Err(e) => return self.abort(e.into()).await,
        };
        if let Some(ip) = self.rewrite_bnd {
            bnd.set_ip(ip);
        }

        let reply = ConnReply::success(AddrPort::from(bnd));
        match timeout_at(self.deadline, self.control.write_all(&reply.to_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return self.abort(e.into()).await,
            Err(_) => return self.abort(SocksError::HandshakeTimeout).await,
        }
        debug!(%bnd, client = %self.client_addr, "udp association established");

        // Deadline is cleared from here on; the control connection is the
        // only lifetime signal.
        let local = Arc::new(local);
        let upstream = Arc::new(self.upstream);
        let (endpoint_tx, endpoint_rx) = watch::channel(None::<SocketAddr>);

        let cancel = self.cancel.clone();
        let mut control = self.control;
        tokio::spawn(async move {
            let mut one = [0u8; 1];
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = control.read(&mut one) => {}
            }
            cancel.cancel();
        });

        let cancel = self.cancel.clone();
        let errs = self.errs.clone();
        let local_tx = local.clone();
        let upstream_rx = upstream.clone();
        tokio::spawn(async move {
            if let Err(e) = upstream_to_client(upstream_rx, local_tx, endpoint_rx, &cancel).await {
                let _ = errs.try_send(SocksError::Io(e));
            }
            cancel.cancel();
        });

        let cancel = self.cancel;
        let errs = self.errs;
        let client_ip = self.client_addr.ip();
        tokio::spawn(async move {
            if let Err(e) =
                client_to_upstream(local, upstream, endpoint_tx, client_ip, &cancel).await
            {
                let _ = errs.try_send(SocksError::Io(e));
            }
            cancel.cancel();
        });
    }

    async fn abort(mut self, err: SocksError) {
        let _ = self.errs.try_send(err);
        let reply = ConnReply::error(Rep::GeneralFailure);
        let _ = timeout_at(self.deadline, self.control.write_all(&reply.to_bytes())).await;
        self.cancel.cancel();
    }
}

/// Reads raw datagrams from the upstream socket and forwards them,
/// encapsulated, to the client endpoint learned by the other pump.
async fn upstream_to_client(
    upstream: Arc<UdpSocket>,
    local: Arc<UdpSocket>,
    mut endpoint: watch::Receiver<Option<SocketAddr>>,
    cancel: &CancellationToken,
) -> std::io::Result<()> {
    let mut buf = pool::take();
    let mut out = pool::take();

    let client = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        r = endpoint.wait_for(|a| a.is_some()) => match r {
            Ok(addr) => match *addr {
                Some(a) => a,
                None => return Ok(()),
            },
            Err(_) => return Ok(()),
        },
    };

    loop {
        let (n, from) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            r = upstream.recv_from(&mut buf) => r?,
        };
        if n == 0 {
            continue;
        }

        let header = UdpHeader::for_source(from).to_bytes();
        if header.len() + n > out.len() {
            continue;
        }
        out[..header.len()].copy_from_slice(&header);
        out[header.len()..header.len() + n].copy_from_slice(&buf[..n]);

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            r = local.send_to(&out[..header.len() + n], client) => { r?; }
        }
    }
}

/// Reads encapsulated datagrams from the client, validates them, pins the
/// client endpoint on the first valid one, and forwards payloads upstream.
/// Anything that fails validation is dropped without a trace.
async fn client_to_upstream(
    local: Arc<UdpSocket>,
    upstream: Arc<UdpSocket>,
    endpoint: watch::Sender<Option<SocketAddr>>,
    client_ip: IpAddr,
    cancel: &CancellationToken,
) -> std::io::Result<()> {
    let mut buf = pool::take();

    loop {
        let (n, from) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            r = local.recv_from(&mut buf) => r?,
        };

        if from.ip() != client_ip {
            continue;
        }
        // A bare header carries no payload; 10 bytes is the IPv4 minimum.
        if n < 11 {
            continue;
        }
        let Ok((header, payload)) = UdpHeader::decode(&buf[..n]) else {
            continue;
        };
        if header.frag != 0 {
            continue;
        }

        if endpoint.borrow().is_none() {
            let _ = endpoint.send(Some(from));
        }

        let target = match &header.dst {
            AddrPort::V4(ip, port) => SocketAddr::from((*ip, *port)),
            AddrPort::V6(ip, port) => SocketAddr::from((*ip, *port)),
            AddrPort::Domain(name, port) => {
                let resolved = tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    r = tokio::net::lookup_host((name.as_str(), *port)) => r,
                };
                match resolved.ok().and_then(|mut addrs| addrs.next()) {
                    Some(addr) => addr,
                    None => continue,
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            r = upstream.send_to(&buf[payload..n], target) => { r?; }
        }
    }
}
