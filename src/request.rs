//! The authorized request handed to the embedder.
//!
//! A [`Request`] exists only after method selection succeeded, the client
//! authenticated, and the request header parsed cleanly. The embedder
//! answers it exactly once: [`Request::success`] with an upstream matching
//! the command, or [`Request::fail`]. Consuming `self` makes the approval
//! slot single-delivery by construction.

use std::net::{IpAddr, SocketAddr};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ATYP;
use crate::conn::reply::{ConnReply, Rep};
use crate::conn::request::CMD;
use crate::error::SocksError;
use crate::parse::AddrPort;
use crate::relay;
use crate::relay::udp::UdpSession;

/// The upstream the embedder prepared for an approved request.
///
/// The variant must match the command: CONNECT takes a byte stream,
/// UDP ASSOCIATE takes a packet socket. A mismatch is answered with REP=1
/// and the connection closes.
pub enum Approval {
    /// Upstream TCP connection for CONNECT.
    Stream(TcpStream),
    /// Upstream packet socket for UDP ASSOCIATE.
    Packet(UdpSocket),
}

/// Server-side context a request needs to run its relay.
#[derive(Clone)]
pub(crate) struct RelayCtx {
    pub bind_ip: IpAddr,
    pub rewrite_bnd: Option<IpAddr>,
    pub errs: mpsc::Sender<SocksError>,
}

/// A fully handshaken client request, waiting for the embedder's verdict.
pub struct Request {
    cmd: CMD,
    dst: AddrPort,
    client: TcpStream,
    client_addr: SocketAddr,
    deadline: Instant,
    cancel: CancellationToken,
    ctx: RelayCtx,
}

impl Request {
    pub(crate) fn new(
        cmd: CMD,
        dst: AddrPort,
        client: TcpStream,
        client_addr: SocketAddr,
        deadline: Instant,
        cancel: CancellationToken,
        ctx: RelayCtx,
    ) -> Self {
        Self {
            cmd,
            dst,
            client,
            client_addr,
            deadline,
            cancel,
            ctx,
        }
    }

    /// The requested command: CONNECT or UDP ASSOCIATE (BIND never reaches
    /// the embedder).
    pub fn cmd(&self) -> CMD {
        self.cmd
    }

    /// Address type of the destination.
    pub fn atyp(&self) -> ATYP {
        self.dst.atyp()
    }

    /// Destination host without the port: a literal IP or a domain name.
    pub fn dst(&self) -> String {
        self.dst.host()
    }

    /// Destination port.
    pub fn dst_port(&self) -> u16 {
        self.dst.port()
    }

    /// The client's remote endpoint.
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Tears down the client connection and, if the relay already started,
    /// the upstream and the UDP session. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Approves the request with a prepared upstream.
    ///
    /// For CONNECT, writes the success reply carrying the upstream socket's
    /// local address and starts the TCP relay. For UDP ASSOCIATE, starts the
    /// UDP session, which announces its own relay endpoint. The handshake
    /// deadline still covers the reply write; it is cleared once the relay
    /// owns the connection.
    pub async fn success(self, upstream: Approval) {
        match (self.cmd, upstream) {
            (CMD::Connect, Approval::Stream(stream)) => self.connect(stream).await,
            (CMD::UdpAssociate, Approval::Packet(socket)) => self.associate(socket).await,
            (cmd, _) => {
                self.abort(SocksError::ApprovalMismatch(cmd.to_string()))
                    .await
            }
        }
    }

    /// Denies the request: replies REP=1, closes the connection, and reports
    /// `err` to the error sink.
    pub async fn fail(self, err: SocksError) {
        self.abort(err).await;
    }

    async fn connect(mut self, upstream: TcpStream) {
        let bnd = match upstream.local_addr() {
            Ok(addr) => addr,
            Err(e) => return self.abort(e.into()).await,
        };

        let reply = ConnReply::success(AddrPort::from(bnd));
        match timeout_at(self.deadline, self.client.write_all(&reply.to_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = self.ctx.errs.try_send(e.into());
                self.cancel.cancel();
                return;
            }
            Err(_) => {
                let _ = self.ctx.errs.try_send(SocksError::HandshakeTimeout);
                self.cancel.cancel();
                return;
            }
        }

        debug!(client = %self.client_addr, dst = %self.dst, "tcp relay started");
        relay::tcp::spawn(self.client, upstream, self.cancel, self.ctx.errs);
    }

    async fn associate(self, upstream: UdpSocket) {
        let session = UdpSession {
            control: self.client,
            client_addr: self.client_addr,
            upstream,
            bind_ip: self.ctx.bind_ip,
            rewrite_bnd: self.ctx.rewrite_bnd,
            deadline: self.deadline,
            cancel: self.cancel,
            errs: self.ctx.errs,
        };
        session.run().await;
    }

    /// Shared failure path: report, best-effort REP=1 reply, tear down.
    pub(crate) async fn abort(mut self, err: SocksError) {
        let _ = self.ctx.errs.try_send(err);
        let reply = ConnReply::error(Rep::GeneralFailure);
        let _ = timeout_at(self.deadline, self.client.write_all(&reply.to_bytes())).await;
        self.cancel.cancel();
    }
}
