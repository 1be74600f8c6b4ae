//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use pweb_relay::config::{HostEntry, ListenConfig, RouteConfig, ServerConfig};
use pweb_relay::{start, RunningServer};

/// A request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// First header value with `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// Start the server on an ephemeral localhost port.
pub async fn start_server(dir: &Path, routes: RouteConfig) -> RunningServer {
    let mut config = ServerConfig::new(dir);
    config.routes = routes;
    start_with_config(config).await
}

pub async fn start_with_config(config: ServerConfig) -> RunningServer {
    let listen = ListenConfig {
        addresses: vec!["127.0.0.1".to_string()],
        port: Some(0),
        ..ListenConfig::default()
    };
    start(config, &listen).await.unwrap()
}

/// `http://127.0.0.1:port` of a running server.
pub fn base_url(server: &RunningServer) -> String {
    format!("http://{}", server.local_addrs()[0])
}

/// Route tables relaying `prefix` to a backend on `addr`.
pub fn relay_routes(prefix: &str, addr: SocketAddr) -> RouteConfig {
    let mut routes = RouteConfig::default();
    routes
        .hosts
        .insert("backend".to_string(), HostEntry::new("http", "127.0.0.1", addr.port()));
    routes.relay.push((prefix.to_string(), "backend".to_string()));
    routes
}

/// Client that never follows redirects or uses a system proxy.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// An address nothing is listening on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a mock backend that records each request and answers with `response` verbatim.
pub async fn start_mock_backend(response: String) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            let response = response.clone();
            tokio::spawn(async move {
                if let Some(captured) = read_request(&mut socket).await {
                    let _ = tx.send(captured);
                }
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });

    (addr, rx)
}

/// Read one request head plus a `Content-Length` body.
async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let mut body = buffer[head_end + 4..].to_vec();
    let captured = CapturedRequest { head, body: Vec::new() };
    let length: usize = captured
        .header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    while body.len() < length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(CapturedRequest { body, ..captured })
}

/// Send raw bytes and read until the server closes the connection.
pub async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8_lossy(&response).to_string()
}

/// What a mock WebSocket backend does with each connection.
#[derive(Debug, Clone, Copy)]
pub enum WsBehavior {
    /// Echo every text and binary message.
    Echo,
    /// Select the first offered subprotocol, then echo.
    EchoWithProtocol,
    /// Close immediately with this code and reason.
    Close(u16, &'static str),
}

/// Something a mock WebSocket backend observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Handshake request headers, plus a `:path` entry with the request target.
    Handshake(Vec<(String, String)>),
    /// Close frame received from the tunnel, as code and reason.
    Closed(Option<(u16, String)>),
}

/// Start a WebSocket backend that reports what it sees on the channel.
pub async fn start_ws_backend(behavior: WsBehavior) -> (SocketAddr, mpsc::UnboundedReceiver<BackendEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let handshake_tx = tx.clone();
                let callback = move |request: &Request, mut response: Response| {
                    let mut headers: Vec<(String, String)> = request
                        .headers()
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                        .collect();
                    headers.push((":path".to_string(), request.uri().to_string()));
                    let _ = handshake_tx.send(BackendEvent::Handshake(headers));

                    if let WsBehavior::EchoWithProtocol = behavior {
                        let first = request
                            .headers()
                            .get("sec-websocket-protocol")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.split(',').next())
                            .map(|v| v.trim().to_string());
                        if let Some(first) = first {
                            response
                                .headers_mut()
                                .insert("sec-websocket-protocol", first.parse().unwrap());
                        }
                    }
                    Ok::<_, ErrorResponse>(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
                    return;
                };

                match behavior {
                    WsBehavior::Echo | WsBehavior::EchoWithProtocol => {
                        while let Some(Ok(message)) = ws.next().await {
                            match message {
                                Message::Text(_) | Message::Binary(_) => {
                                    if ws.send(message).await.is_err() {
                                        break;
                                    }
                                }
                                Message::Close(frame) => {
                                    let close = frame.map(|f| (u16::from(f.code), f.reason.to_string()));
                                    let _ = tx.send(BackendEvent::Closed(close));
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                    WsBehavior::Close(code, reason) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.to_string().into(),
                        };
                        let _ = ws.send(Message::Close(Some(frame))).await;
                        while let Some(Ok(_)) = ws.next().await {}
                    }
                }
            });
        }
    });

    (addr, rx)
}

/// Send a raw request and return the response head once it is complete.
pub async fn raw_response_head(stream: &mut TcpStream, request: &str) -> String {
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    tokio::time::timeout(Duration::from_secs(10), async {
        while !head.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte).await.unwrap() == 0 {
                break;
            }
            head.push(byte[0]);
        }
    })
    .await
    .unwrap();
    String::from_utf8_lossy(&head).to_string()
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
