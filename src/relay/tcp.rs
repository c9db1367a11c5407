//! Bidirectional byte pump for approved CONNECT requests.
//!
//! Two independent tasks copy client→upstream and upstream→client. Either
//! pump terminating, for any reason, fires the request's cancel token; the
//! partner pump observes it and exits, and both sockets close when their
//! halves drop.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SocksError;

const COPY_BUF: usize = 16 * 1024;

/// Starts both pumps. Clean EOF is not reported; true I/O errors go to the
/// error queue.
pub(crate) fn spawn(
    client: TcpStream,
    upstream: TcpStream,
    cancel: CancellationToken,
    errs: mpsc::Sender<SocksError>,
) {
    let (client_rd, client_wr) = client.into_split();
    let (upstream_rd, upstream_wr) = upstream.into_split();

    spawn_pump(client_rd, upstream_wr, cancel.clone(), errs.clone());
    spawn_pump(upstream_rd, client_wr, cancel, errs);
}

fn spawn_pump<R, W>(rd: R, wr: W, cancel: CancellationToken, errs: mpsc::Sender<SocksError>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = pump(rd, wr, cancel.clone()).await {
            let _ = errs.try_send(SocksError::Io(e));
        } else {
            debug!("relay direction finished");
        }
        cancel.cancel();
    });
}

/// Copies until EOF, error, or cancellation. Writes exactly the bytes read,
/// in order; a failed or short write surfaces as the error that ends the
/// pump.
async fn pump<R, W>(mut rd: R, mut wr: W, cancel: CancellationToken) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF];
    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            r = rd.read(&mut buf) => r?,
        };
        if n == 0 {
            let _ = wr.shutdown().await;
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            r = wr.write_all(&buf[..n]) => r?,
        }
    }
}
