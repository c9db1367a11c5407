//! Server frontend: listener, request queue, lifecycle.
//!
//! The server accepts connections and runs handshakes, but never dials
//! anywhere itself: fully handshaken requests are queued for the embedder,
//! which answers each one through its approval slot. Lifecycle is
//! `new → listening → stopped`; stopping cancels the root token, which
//! every handshake, relay, and UDP session hangs off.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AuthRegistry, Authenticator};
use crate::error::SocksError;
use crate::handshake::{self, ConnCtx};
use crate::request::{RelayCtx, Request};

/// Generous bound; a full queue fails the handshake with REP=1 instead of
/// blocking the accept loop.
const REQUEST_QUEUE: usize = 65535;

const ERROR_QUEUE: usize = 256;

const STATE_NEW: u8 = 0;
const STATE_LISTENING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Options for a [`Server`].
pub struct ServerOpts {
    /// Gate for UDP ASSOCIATE; when false such requests are answered with
    /// REP=2.
    pub allow_udp: bool,
    /// Substituted into the ASSOCIATE reply's BND.ADDR while keeping the
    /// ephemeral port. Useful behind NAT or when bound to a wildcard
    /// address.
    pub rewrite_bnd: Option<std::net::IpAddr>,
    /// Deadline covering the whole handshake phase.
    pub timeout: Duration,
    /// Receives non-fatal per-connection errors; without a sink they are
    /// logged and discarded.
    pub error_sink: Option<mpsc::Sender<SocksError>>,
}

impl Default for ServerOpts {
    fn default() -> Self {
        Self {
            allow_udp: false,
            rewrite_bnd: None,
            timeout: Duration::from_secs(60),
            error_sink: None,
        }
    }
}

/// The SOCKS5 server.
///
/// ```no_run
/// use std::sync::Arc;
/// use socks5_relay::auth::NoAuth;
/// use socks5_relay::{Approval, Server, ServerOpts, SocksError};
/// use tokio::net::TcpStream;
///
/// # async fn run() -> Result<(), SocksError> {
/// let server = Server::new("127.0.0.1:1080", ServerOpts::default());
/// server.add_auth(Arc::new(NoAuth));
/// server.listen().await?;
///
/// while let Some(req) = server.accept_request().await {
///     tokio::spawn(async move {
///         let host = req.dst();
///         match TcpStream::connect((host.as_str(), req.dst_port())).await {
///             Ok(upstream) => req.success(Approval::Stream(upstream)).await,
///             Err(e) => req.fail(e.into()).await,
///         }
///     });
/// }
/// # Ok(())
/// # }
/// ```
pub struct Server {
    addr: String,
    opts: ServerOpts,
    auths: AuthRegistry,
    req_tx: mpsc::Sender<Request>,
    req_rx: tokio::sync::Mutex<mpsc::Receiver<Request>>,
    errs: mpsc::Sender<SocksError>,
    err_rx: Mutex<Option<mpsc::Receiver<SocksError>>>,
    root: CancellationToken,
    local: OnceLock<SocketAddr>,
    state: AtomicU8,
}

impl Server {
    /// Allocates a server bound to nothing yet; [`listen`](Server::listen)
    /// does the I/O.
    pub fn new(addr: impl Into<String>, opts: ServerOpts) -> Self {
        let (req_tx, req_rx) = mpsc::channel(REQUEST_QUEUE);
        let (errs, err_rx) = mpsc::channel(ERROR_QUEUE);
        Self {
            addr: addr.into(),
            opts,
            auths: AuthRegistry::new(),
            req_tx,
            req_rx: tokio::sync::Mutex::new(req_rx),
            errs,
            err_rx: Mutex::new(Some(err_rx)),
            root: CancellationToken::new(),
            local: OnceLock::new(),
            state: AtomicU8::new(STATE_NEW),
        }
    }

    /// Registers an authenticator under its method byte.
    pub fn add_auth(&self, auth: Arc<dyn Authenticator>) {
        self.auths.set(auth);
    }

    /// Unregisters the authenticator for a method byte.
    pub fn del_auth(&self, method: u8) {
        self.auths.remove(method);
    }

    /// Fetches the authenticator registered for a method byte.
    pub fn get_auth(&self, method: u8) -> Option<Arc<dyn Authenticator>> {
        self.auths.get(method)
    }

    /// The bound listener address, available once `listen` succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local.get().copied()
    }

    /// Binds the listener and starts accepting. Bind failures are returned
    /// directly and are fatal to this instance.
    pub async fn listen(&self) -> Result<(), SocksError> {
        match self.state.compare_exchange(
            STATE_NEW,
            STATE_LISTENING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {}
            Err(STATE_LISTENING) => return Err(SocksError::AlreadyListening),
            Err(_) => return Err(SocksError::Stopped),
        }

        let listener = TcpListener::bind(self.addr.as_str()).await?;
        let local = listener.local_addr()?;
        let _ = self.local.set(local);
        info!(%local, "socks5 server listening");

        self.spawn_error_drain();

        let ctx = ConnCtx {
            auths: self.auths.clone(),
            req_tx: self.req_tx.clone(),
            errs: self.errs.clone(),
            relay: RelayCtx {
                bind_ip: local.ip(),
                rewrite_bnd: self.opts.rewrite_bnd,
                errs: self.errs.clone(),
            },
            allow_udp: self.opts.allow_udp,
            timeout: self.opts.timeout,
            root: self.root.clone(),
        };
        let root = self.root.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = root.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((conn, peer)) => {
                            debug!(client = %peer, "accepted connection");
                            // One task per connection; a panicking handshake
                            // dies alone.
                            tokio::spawn(handshake::handle(conn, peer, ctx.clone()));
                        }
                        Err(e) => {
                            let _ = ctx.errs.try_send(e.into());
                        }
                    },
                }
            }
        });
        Ok(())
    }

    /// Forwards queued errors to the configured sink, or logs them. Exits
    /// on root cancellation without closing its input, so producers never
    /// race a closed channel.
    fn spawn_error_drain(&self) {
        let Some(mut rx) = self.err_rx.lock().ok().and_then(|mut slot| slot.take()) else {
            return;
        };
        let sink = self.opts.error_sink.clone();
        let root = self.root.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = root.cancelled() => break,
                    err = rx.recv() => match err {
                        Some(e) => match &sink {
                            Some(s) => {
                                let _ = s.send(e).await;
                            }
                            None => warn!(error = %e, "connection error"),
                        },
                        None => break,
                    },
                }
            }
        });
    }

    /// Blocks until a fully handshaken request is available. Returns `None`
    /// once the server is stopped; requests still queued at that point are
    /// torn down by their cancel tokens.
    pub async fn accept_request(&self) -> Option<Request> {
        let mut rx = self.req_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.root.cancelled() => None,
            req = rx.recv() => req,
        }
    }

    /// Stops the server: the listener closes, in-flight requests and relays
    /// are cancelled, and `accept_request` returns `None`. Idempotent.
    pub fn stop(&self) {
        let prev = self.state.swap(STATE_STOPPED, Ordering::SeqCst);
        self.root.cancel();
        if prev != STATE_STOPPED {
            info!("socks5 server stopped");
        }
    }
}
