//! Per-connection handshake state machine.
//!
//! Drives an accepted connection through GREETING → METHOD-SELECT → AUTH →
//! REQUEST-PARSE → DISPATCH, with the configured deadline applied to every
//! read and write along the way. All failures close only this connection
//! and surface on the error queue; the accept loop never sees them.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::AuthRegistry;
use crate::conn::reply::{ConnReply, Rep};
use crate::conn::request::{CMD, ConnRequest};
use crate::error::SocksError;
use crate::msg::message::{MethodSelection, VersionMessage};
use crate::msg::method::{FixedMethod, Method};
use crate::request::{RelayCtx, Request};

/// Everything a handshake task needs, cloned per connection.
#[derive(Clone)]
pub(crate) struct ConnCtx {
    pub auths: AuthRegistry,
    pub req_tx: mpsc::Sender<Request>,
    pub errs: mpsc::Sender<SocksError>,
    pub relay: RelayCtx,
    pub allow_udp: bool,
    pub timeout: Duration,
    pub root: CancellationToken,
}

/// Applies the handshake deadline to a single I/O operation.
async fn timed<F, T>(deadline: Instant, fut: F) -> Result<T, SocksError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout_at(deadline, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(SocksError::HandshakeTimeout),
    }
}

/// Runs the full handshake for one accepted connection.
pub(crate) async fn handle(mut conn: TcpStream, peer: SocketAddr, ctx: ConnCtx) {
    let deadline = Instant::now() + ctx.timeout;

    if let Err(e) = negotiate(&mut conn, deadline, &ctx).await {
        debug!(client = %peer, error = %e, "handshake failed");
        let _ = ctx.errs.try_send(e);
        return;
    }

    if let Err(e) = dispatch(conn, peer, deadline, &ctx).await {
        debug!(client = %peer, error = %e, "request rejected");
        let _ = ctx.errs.try_send(e);
    }
}

/// GREETING through AUTH.
async fn negotiate(
    conn: &mut TcpStream,
    deadline: Instant,
    ctx: &ConnCtx,
) -> Result<(), SocksError> {
    let mut head = [0u8; 2];
    timed(deadline, conn.read_exact(&mut head)).await?;

    let mut greeting = vec![0u8; 2 + head[1] as usize];
    greeting[..2].copy_from_slice(&head);
    timed(deadline, conn.read_exact(&mut greeting[2..])).await?;
    let hello = VersionMessage::try_from(greeting.as_slice())?;

    // First client method with a registered authenticator wins.
    let chosen = hello
        .methods
        .iter()
        .find_map(|m| ctx.auths.get(m.to_u8()));
    let Some(auth) = chosen else {
        let refusal = MethodSelection::new(Method::Fixed(FixedMethod::NoAcceptable));
        let _ = timed(deadline, conn.write_all(&refusal.to_bytes())).await;
        return Err(SocksError::NoAcceptableMethod);
    };

    let selection = MethodSelection::new(Method::from(auth.method()));
    timed(deadline, conn.write_all(&selection.to_bytes())).await?;

    let passed = timeout_at(deadline, auth.check(conn))
        .await
        .map_err(|_| SocksError::HandshakeTimeout)?;
    if !passed {
        return Err(SocksError::AuthFailed(format!(
            "method {:#04x}",
            auth.method()
        )));
    }
    Ok(())
}

/// REQUEST-PARSE and DISPATCH. Owns the connection from here: it either
/// moves into a [`Request`] or is closed on return.
async fn dispatch(
    mut conn: TcpStream,
    peer: SocketAddr,
    deadline: Instant,
    ctx: &ConnCtx,
) -> Result<(), SocksError> {
    let request = match read_request(&mut conn, deadline).await {
        Ok(r) => r,
        Err(SocksError::UnsupportedCommand(cmd)) => {
            reply_error(&mut conn, Rep::CommandNotSupported, deadline).await;
            return Err(SocksError::UnsupportedCommand(cmd));
        }
        Err(e) => return Err(e),
    };

    match request.cmd {
        CMD::Bind => {
            reply_error(&mut conn, Rep::CommandNotSupported, deadline).await;
            return Err(SocksError::UnsupportedCommand(CMD::Bind as u8));
        }
        CMD::UdpAssociate if !ctx.allow_udp => {
            reply_error(&mut conn, Rep::ConnectionNotAllowed, deadline).await;
            return Err(SocksError::UdpDisabled);
        }
        _ => {}
    }

    debug!(client = %peer, request = %request, "request authorized");
    let request = Request::new(
        request.cmd,
        request.dst,
        conn,
        peer,
        deadline,
        ctx.root.child_token(),
        ctx.relay.clone(),
    );

    // Never block the accept path: a full or closed queue fails the request.
    if let Err(send_err) = ctx.req_tx.try_send(request) {
        let request = match send_err {
            mpsc::error::TrySendError::Full(r) => r,
            mpsc::error::TrySendError::Closed(r) => r,
        };
        request.abort(SocksError::QueueFull).await;
    }
    Ok(())
}

/// Reads exactly one request header off the wire and decodes it.
async fn read_request(conn: &mut TcpStream, deadline: Instant) -> Result<ConnRequest, SocksError> {
    let mut head = [0u8; 4];
    timed(deadline, conn.read_exact(&mut head)).await?;
    if head[0] != 0x05 {
        return Err(SocksError::UnsupportedVersion(head[0]));
    }

    let mut domain_len = None;
    let addr_len = match head[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            timed(deadline, conn.read_exact(&mut len)).await?;
            domain_len = Some(len[0]);
            len[0] as usize
        }
        other => return Err(SocksError::InvalidAddressType(other)),
    };

    let mut rest = vec![0u8; addr_len + 2];
    timed(deadline, conn.read_exact(&mut rest)).await?;

    let mut raw = Vec::with_capacity(5 + rest.len());
    raw.extend_from_slice(&head);
    if let Some(len) = domain_len {
        raw.push(len);
    }
    raw.extend_from_slice(&rest);
    ConnRequest::try_from(raw.as_slice())
}

/// Best-effort error reply; the connection closes right after.
async fn reply_error(conn: &mut TcpStream, rep: Rep, deadline: Instant) {
    let reply = ConnReply::error(rep);
    let _ = timed(deadline, conn.write_all(&reply.to_bytes())).await;
}
