//! End-to-end TCP scenarios against a live server on loopback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use socks5_relay::auth::{NoAuth, UserPass};
use socks5_relay::{Approval, CMD, Server, ServerOpts, SocksError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Embedder that dials CONNECT destinations directly and flags every
/// request it sees.
fn spawn_dialer(server: Arc<Server>, seen: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while let Some(req) = server.accept_request().await {
            seen.store(true, Ordering::SeqCst);
            tokio::spawn(async move {
                match req.cmd() {
                    CMD::Connect => {
                        let host = req.dst();
                        match TcpStream::connect((host.as_str(), req.dst_port())).await {
                            Ok(upstream) => req.success(Approval::Stream(upstream)).await,
                            Err(e) => req.fail(e.into()).await,
                        }
                    }
                    other => {
                        req.fail(SocksError::UnsupportedCommand(other as u8)).await;
                    }
                }
            });
        }
    });
}

async fn spawn_echo() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut rd, mut wr) = stream.into_split();
            tokio::spawn(async move {
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });
    addr
}

async fn start_noauth() -> (Arc<Server>, std::net::SocketAddr, Arc<AtomicBool>) {
    let server = Arc::new(Server::new("127.0.0.1:0", ServerOpts::default()));
    server.add_auth(Arc::new(NoAuth));
    server.listen().await.unwrap();
    let addr = server.local_addr().unwrap();
    let seen = Arc::new(AtomicBool::new(false));
    spawn_dialer(server.clone(), seen.clone());
    (server, addr, seen)
}

fn connect_request(addr: std::net::SocketAddr) -> Vec<u8> {
    let std::net::SocketAddr::V4(v4) = addr else {
        panic!("loopback test address should be IPv4");
    };
    let mut req = vec![5, 1, 0, 1];
    req.extend_from_slice(&v4.ip().octets());
    req.extend_from_slice(&v4.port().to_be_bytes());
    req
}

#[tokio::test]
async fn connect_relays_bytes_verbatim() {
    let (_server, proxy, _) = start_noauth().await;
    let echo = spawn_echo().await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[5, 1, 0]).await.unwrap();
    let mut sel = [0u8; 2];
    client.read_exact(&mut sel).await.unwrap();
    assert_eq!(sel, [5, 0]);

    client.write_all(&connect_request(echo)).await.unwrap();
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 5);
    assert_eq!(reply[1], 0);
    assert_eq!(reply[3], 1);

    for chunk in [&b"hello"[..], &b" "[..], &b"world"[..]] {
        client.write_all(chunk).await.unwrap();
    }
    let mut out = [0u8; 11];
    client.read_exact(&mut out).await.unwrap();
    assert_eq!(&out, b"hello world");
}

#[tokio::test]
async fn unregistered_method_is_refused() {
    let (_server, proxy, seen) = start_noauth().await;

    // Only USER/PASS offered, only NoAuth registered.
    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[5, 1, 2]).await.unwrap();
    let mut sel = [0u8; 2];
    client.read_exact(&mut sel).await.unwrap();
    assert_eq!(sel, [5, 0xFF]);

    let n = client.read(&mut [0u8; 1]).await.unwrap();
    assert_eq!(n, 0, "server should close after 0xFF");
    assert!(!seen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn greeting_with_zero_methods_closes_without_reply() {
    let (_server, proxy, seen) = start_noauth().await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[5, 0]).await.unwrap();
    let n = client.read(&mut [0u8; 2]).await.unwrap();
    assert_eq!(n, 0);
    assert!(!seen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn wrong_password_fails_before_dispatch() {
    let server = Arc::new(Server::new("127.0.0.1:0", ServerOpts::default()));
    let users = Arc::new(UserPass::new());
    users.add("alice", "secret");
    server.add_auth(users);
    server.listen().await.unwrap();
    let proxy = server.local_addr().unwrap();
    let seen = Arc::new(AtomicBool::new(false));
    spawn_dialer(server.clone(), seen.clone());

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[5, 1, 2]).await.unwrap();
    let mut sel = [0u8; 2];
    client.read_exact(&mut sel).await.unwrap();
    assert_eq!(sel, [5, 2]);

    let mut bad = vec![1, 5];
    bad.extend_from_slice(b"alice");
    bad.push(5);
    bad.extend_from_slice(b"wrong");
    client.write_all(&bad).await.unwrap();

    let mut status = [0u8; 2];
    client.read_exact(&mut status).await.unwrap();
    assert_eq!(status, [1, 1]);

    let n = client.read(&mut [0u8; 1]).await.unwrap();
    assert_eq!(n, 0);
    assert!(!seen.load(Ordering::SeqCst), "request must never reach the embedder");
}

#[tokio::test]
async fn correct_password_reaches_relay() {
    let server = Arc::new(Server::new("127.0.0.1:0", ServerOpts::default()));
    let users = Arc::new(UserPass::new());
    users.add("alice", "secret");
    server.add_auth(users);
    server.listen().await.unwrap();
    let proxy = server.local_addr().unwrap();
    spawn_dialer(server.clone(), Arc::new(AtomicBool::new(false)));
    let echo = spawn_echo().await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[5, 1, 2]).await.unwrap();
    let mut sel = [0u8; 2];
    client.read_exact(&mut sel).await.unwrap();
    assert_eq!(sel, [5, 2]);

    let mut good = vec![1, 5];
    good.extend_from_slice(b"alice");
    good.push(6);
    good.extend_from_slice(b"secret");
    client.write_all(&good).await.unwrap();
    let mut status = [0u8; 2];
    client.read_exact(&mut status).await.unwrap();
    assert_eq!(status, [1, 0]);

    client.write_all(&connect_request(echo)).await.unwrap();
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0);

    client.write_all(b"ping").await.unwrap();
    let mut out = [0u8; 4];
    client.read_exact(&mut out).await.unwrap();
    assert_eq!(&out, b"ping");
}

#[tokio::test]
async fn bind_gets_command_not_supported() {
    let (_server, proxy, seen) = start_noauth().await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[5, 1, 0]).await.unwrap();
    let mut sel = [0u8; 2];
    client.read_exact(&mut sel).await.unwrap();

    client
        .write_all(&[5, 2, 0, 1, 0, 0, 0, 0, 0, 0])
        .await
        .unwrap();
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [5, 7, 0, 1, 0, 0, 0, 0, 0, 0]);

    let n = client.read(&mut [0u8; 1]).await.unwrap();
    assert_eq!(n, 0);
    assert!(!seen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn associate_is_gated_when_udp_disabled() {
    let (_server, proxy, seen) = start_noauth().await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[5, 1, 0]).await.unwrap();
    let mut sel = [0u8; 2];
    client.read_exact(&mut sel).await.unwrap();

    client
        .write_all(&[5, 3, 0, 1, 0, 0, 0, 0, 0, 0])
        .await
        .unwrap();
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [5, 2, 0, 1, 0, 0, 0, 0, 0, 0]);
    assert!(!seen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn approval_mismatch_replies_general_failure() {
    let server = Arc::new(Server::new("127.0.0.1:0", ServerOpts::default()));
    server.add_auth(Arc::new(NoAuth));
    server.listen().await.unwrap();
    let proxy = server.local_addr().unwrap();

    // Wrong kind on purpose: a packet socket for CONNECT.
    let handle = server.clone();
    tokio::spawn(async move {
        while let Some(req) = handle.accept_request().await {
            let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
            req.success(Approval::Packet(socket)).await;
        }
    });

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[5, 1, 0]).await.unwrap();
    let mut sel = [0u8; 2];
    client.read_exact(&mut sel).await.unwrap();

    client
        .write_all(&[5, 1, 0, 1, 127, 0, 0, 1, 0, 80])
        .await
        .unwrap();
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 1);
}

#[tokio::test]
async fn protocol_errors_reach_the_error_sink() {
    let (err_tx, mut err_rx) = tokio::sync::mpsc::channel(16);
    let server = Arc::new(Server::new(
        "127.0.0.1:0",
        ServerOpts {
            error_sink: Some(err_tx),
            ..Default::default()
        },
    ));
    server.add_auth(Arc::new(NoAuth));
    server.listen().await.unwrap();
    let proxy = server.local_addr().unwrap();

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[4, 1, 0]).await.unwrap();
    let _ = client.read(&mut [0u8; 2]).await;

    let err = timeout(Duration::from_secs(2), err_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, SocksError::UnsupportedVersion(4)));
}

#[tokio::test]
async fn cancelled_request_closes_client_without_reply() {
    let server = Arc::new(Server::new("127.0.0.1:0", ServerOpts::default()));
    server.add_auth(Arc::new(NoAuth));
    server.listen().await.unwrap();
    let proxy = server.local_addr().unwrap();

    let handle = server.clone();
    tokio::spawn(async move {
        while let Some(req) = handle.accept_request().await {
            assert_eq!(req.cmd(), CMD::Connect);
            assert_eq!(req.atyp(), socks5_relay::ATYP::V4);
            assert_eq!(req.dst(), "192.0.2.7");
            assert_eq!(req.dst_port(), 80);
            assert!(req.client_addr().ip().is_loopback());
            req.cancel();
            req.cancel();
        }
    });

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[5, 1, 0]).await.unwrap();
    let mut sel = [0u8; 2];
    client.read_exact(&mut sel).await.unwrap();

    client
        .write_all(&[5, 1, 0, 1, 192, 0, 2, 7, 0, 80])
        .await
        .unwrap();
    let n = timeout(Duration::from_secs(2), client.read(&mut [0u8; 16]))
        .await
        .expect("connection should close")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn del_auth_unregisters_a_method() {
    let server = Arc::new(Server::new("127.0.0.1:0", ServerOpts::default()));
    server.add_auth(Arc::new(NoAuth));
    let users = Arc::new(UserPass::new());
    users.add("alice", "secret");
    server.add_auth(users);
    server.listen().await.unwrap();
    let proxy = server.local_addr().unwrap();

    assert!(server.get_auth(0x02).is_some());
    server.del_auth(0x02);
    assert!(server.get_auth(0x02).is_none());

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[5, 1, 2]).await.unwrap();
    let mut sel = [0u8; 2];
    client.read_exact(&mut sel).await.unwrap();
    assert_eq!(sel, [5, 0xFF]);
}

#[tokio::test]
async fn stop_is_idempotent_and_unblocks_accept() {
    let (server, proxy, _) = start_noauth().await;

    // A live relay should be torn down by stop as well.
    let echo = spawn_echo().await;
    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[5, 1, 0]).await.unwrap();
    let mut sel = [0u8; 2];
    client.read_exact(&mut sel).await.unwrap();
    client.write_all(&connect_request(echo)).await.unwrap();
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();

    assert!(matches!(
        server.listen().await,
        Err(SocksError::AlreadyListening)
    ));

    server.stop();
    server.stop();

    assert!(matches!(server.listen().await, Err(SocksError::Stopped)));

    let next = timeout(Duration::from_secs(1), server.accept_request())
        .await
        .expect("accept_request must not hang after stop");
    assert!(next.is_none());

    // The relayed connection is cancelled; reads drain to EOF or error.
    let mut sink = [0u8; 64];
    let eof = timeout(Duration::from_secs(2), async {
        loop {
            match client.read(&mut sink).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    assert!(eof.is_ok(), "client connection should close after stop");
}
