//! WebSocket tunnelling to relay backends.
//!
//! # Responsibilities
//! - Open the backend WebSocket before accepting the client upgrade
//! - Forward text and binary messages in both directions, keeping their type
//! - Propagate close frames (code and reason) to the opposite side
//! - Tear the tunnel down when either side ends or the server stops
//!
//! # Data Flow
//! ```text
//! client ─▶ read(client) ─▶ [queue] ─▶ write(backend) ─▶ backend
//! client ◀─ write(client) ◀─ [queue] ◀─ read(backend) ◀─ backend
//! ```
//!
//! # Design Decisions
//! - Four independent loops joined through two unbounded FIFO queues;
//!   a reader never waits on the opposite writer
//! - A close received on one side is queued like a message, so everything
//!   read before it is delivered first
//! - Ping and pong are answered by each socket itself and not forwarded
//! - The tunnel owns a child of the server shutdown token; once one loop
//!   has finished the rest get a short grace period before cancellation

use std::fmt::Display;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::Response;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::error::{ProtocolError, SubProtocolError};
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::config::HostEntry;
use crate::http::request::{raw_path, rewrite_authority};
use crate::http::response::error_response;
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionId, ConnectionTracker};
use crate::url_rewrite::join_path;

/// Time the remaining loops get once one side of a tunnel has finished.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Upper bound for delivering a close frame.
const CLOSE_SEND_TIMEOUT: Duration = Duration::from_secs(1);

const NORMAL_CLOSURE: u16 = 1000;
const GOING_AWAY: u16 = 1001;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Failure to open the backend side of a tunnel.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("invalid backend websocket request: {0}")]
    InvalidRequest(#[source] tungstenite::Error),

    #[error("backend websocket connect failed: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("backend websocket connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("server is stopping")]
    Stopping,
}

/// Settings shared by every tunnel of a server.
#[derive(Debug, Clone)]
pub struct TunnelSettings {
    pub shutdown: Shutdown,
    pub tracker: ConnectionTracker,
    pub connect_timeout: Duration,
}

/// Connect to `host`, then accept the client upgrade and run the tunnel.
///
/// When the backend cannot be reached the client gets a 500 and no upgrade.
pub async fn tunnel(
    settings: &TunnelSettings,
    upgrade: WebSocketUpgrade,
    request: Request<Body>,
    host: &HostEntry,
) -> Response {
    let path = raw_path(request.uri()).to_string();
    let url = join_path(&host.websocket_base_url(), &[&path]);

    let (upstream, protocol) = match connect_upstream(settings, &url, request.headers(), host).await {
        Ok(connected) => connected,
        Err(e) => {
            if settings.shutdown.is_triggered() {
                tracing::debug!(url = %url, error = %e, "Tunnel not opened during shutdown");
            } else {
                tracing::error!(url = %url, error = %e, "Backend websocket unavailable");
            }
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    let upgrade = match protocol {
        Some(protocol) => upgrade.protocols([protocol]),
        None => upgrade,
    };

    let guard = settings.tracker.track();
    let token = settings.shutdown.child();
    let failed_path = path.clone();

    upgrade
        .on_failed_upgrade(move |e| {
            tracing::warn!(path = %failed_path, error = %e, "Client websocket upgrade failed");
        })
        .on_upgrade(move |downstream| async move {
            tracing::debug!(tunnel = %guard.id(), path = %path, "Tunnel open");
            run(downstream, upstream, token, guard.id()).await;
            tracing::debug!(tunnel = %guard.id(), "Tunnel closed");
        })
}

/// Open the backend socket, offering the client's subprotocols first.
///
/// A backend that accepts none of them is reconnected without the offer.
async fn connect_upstream(
    settings: &TunnelSettings,
    url: &str,
    inbound: &HeaderMap,
    host: &HostEntry,
) -> Result<(UpstreamSocket, Option<String>), TunnelError> {
    let offered = inbound.get(header::SEC_WEBSOCKET_PROTOCOL);
    match open_upstream(settings, url, inbound, host, offered).await {
        Err(TunnelError::Connect(e)) if offered.is_some() && is_missing_subprotocol(&e) => {
            tracing::debug!(url = %url, "Backend selected no subprotocol, reconnecting without offer");
            open_upstream(settings, url, inbound, host, None).await
        }
        result => result,
    }
}

async fn open_upstream(
    settings: &TunnelSettings,
    url: &str,
    inbound: &HeaderMap,
    host: &HostEntry,
    protocols: Option<&HeaderValue>,
) -> Result<(UpstreamSocket, Option<String>), TunnelError> {
    let mut request = url.into_client_request().map_err(TunnelError::InvalidRequest)?;

    let headers = request.headers_mut();
    for name in [header::COOKIE, header::USER_AGENT] {
        if let Some(value) = inbound.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    if let Some(protocols) = protocols {
        headers.insert(header::SEC_WEBSOCKET_PROTOCOL, protocols.clone());
    }
    if let Some(origin) = inbound.get(header::ORIGIN).and_then(|v| rewrite_authority(v, host)) {
        headers.insert(header::ORIGIN, origin);
    }

    let connect = tokio::time::timeout(settings.connect_timeout, tokio_tungstenite::connect_async(request));
    let (socket, response) = tokio::select! {
        result = connect => result
            .map_err(|_| TunnelError::Timeout(settings.connect_timeout))?
            .map_err(TunnelError::Connect)?,
        _ = settings.shutdown.triggered() => return Err(TunnelError::Stopping),
    };

    let protocol = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Ok((socket, protocol))
}

fn is_missing_subprotocol(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::Protocol(ProtocolError::SecWebSocketSubProtocolError(
            SubProtocolError::NoSubProtocol
        ))
    )
}

async fn run(downstream: WebSocket, upstream: UpstreamSocket, token: CancellationToken, id: ConnectionId) {
    let (client_sink, client_stream) = downstream.split();
    let (backend_sink, backend_stream) = upstream.split();
    let (to_backend, backend_queue) = mpsc::unbounded_channel();
    let (to_client, client_queue) = mpsc::unbounded_channel();

    let mut loops = JoinSet::new();
    loops.spawn(read_loop(client_stream, to_backend, token.clone(), id, "client", Relayed::from_axum));
    loops.spawn(read_loop(backend_stream, to_client, token.clone(), id, "backend", Relayed::from_tungstenite));
    loops.spawn(write_loop(backend_sink, backend_queue, token.clone(), id, "backend", Relayed::into_tungstenite));
    loops.spawn(write_loop(client_sink, client_queue, token.clone(), id, "client", Relayed::into_axum));

    if let Some(first) = loops.join_next().await {
        log_join(id, first);
        if tokio::time::timeout(CLOSE_GRACE, drain(id, &mut loops)).await.is_err() {
            tracing::debug!(tunnel = %id, "Tunnel loops still running after close, cancelling");
            token.cancel();
            drain(id, &mut loops).await;
        }
    }
    token.cancel();
}

async fn drain(id: ConnectionId, loops: &mut JoinSet<()>) {
    while let Some(result) = loops.join_next().await {
        log_join(id, result);
    }
}

fn log_join(id: ConnectionId, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(tunnel = %id, error = %e, "Tunnel loop panicked");
        }
    }
}

/// Read messages from one side and queue them for the other.
async fn read_loop<S, M, E, F>(
    mut stream: S,
    queue: mpsc::UnboundedSender<Relayed>,
    token: CancellationToken,
    id: ConnectionId,
    side: &'static str,
    convert: F,
) where
    S: Stream<Item = Result<M, E>> + Unpin,
    E: Display,
    F: Fn(M) -> Option<Relayed>,
{
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(message)) => match convert(message) {
                Some(close @ Relayed::Close(_)) => {
                    tracing::debug!(tunnel = %id, side, frame = ?close, "Close received");
                    let _ = queue.send(close);
                    break;
                }
                Some(relayed) => {
                    if queue.send(relayed).is_err() {
                        break;
                    }
                }
                None => {}
            },
            Some(Err(e)) => {
                if token.is_cancelled() {
                    tracing::debug!(tunnel = %id, side, error = %e, "Read ended during shutdown");
                } else {
                    tracing::warn!(tunnel = %id, side, error = %e, "Websocket read failed");
                }
                break;
            }
            None => break,
        }
    }
}

/// Send queued messages to one side until a close is delivered.
async fn write_loop<K, M, F>(
    mut sink: K,
    mut queue: mpsc::UnboundedReceiver<Relayed>,
    token: CancellationToken,
    id: ConnectionId,
    side: &'static str,
    convert: F,
) where
    K: Sink<M> + Unpin,
    K::Error: Display,
    F: Fn(Relayed) -> M,
{
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => Relayed::close(GOING_AWAY, "server stopping"),
            next = queue.recv() => next.unwrap_or_else(|| Relayed::close(NORMAL_CLOSURE, "")),
        };

        if let Relayed::Close(_) = next {
            let close = async {
                sink.send(convert(next)).await?;
                sink.close().await
            };
            match tokio::time::timeout(CLOSE_SEND_TIMEOUT, close).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(tunnel = %id, side, error = %e, "Close not delivered"),
                Err(_) => tracing::debug!(tunnel = %id, side, "Close timed out"),
            }
            break;
        }

        let sent = tokio::select! {
            _ = token.cancelled() => break,
            sent = sink.send(convert(next)) => sent,
        };
        if let Err(e) = sent {
            if token.is_cancelled() {
                tracing::debug!(tunnel = %id, side, error = %e, "Write ended during shutdown");
            } else {
                tracing::warn!(tunnel = %id, side, error = %e, "Websocket write failed");
            }
            break;
        }
    }
}

/// A message in transit between the two sides of a tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Relayed {
    Text(String),
    Binary(Bytes),
    /// Close code and reason, `None` when the peer sent an empty close.
    Close(Option<(u16, String)>),
}

impl Relayed {
    fn close(code: u16, reason: &str) -> Self {
        Relayed::Close(Some((code, reason.to_string())))
    }

    fn from_axum(message: ws::Message) -> Option<Self> {
        match message {
            ws::Message::Text(text) => Some(Relayed::Text(text.as_str().to_string())),
            ws::Message::Binary(data) => Some(Relayed::Binary(data)),
            ws::Message::Close(frame) => Some(Relayed::Close(
                frame.map(|f| (f.code, f.reason.as_str().to_string())),
            )),
            ws::Message::Ping(_) | ws::Message::Pong(_) => None,
        }
    }

    fn into_axum(self) -> ws::Message {
        match self {
            Relayed::Text(text) => ws::Message::Text(text.into()),
            Relayed::Binary(data) => ws::Message::Binary(data),
            Relayed::Close(frame) => ws::Message::Close(frame.map(|(code, reason)| ws::CloseFrame {
                code,
                reason: reason.into(),
            })),
        }
    }

    fn from_tungstenite(message: tungstenite::Message) -> Option<Self> {
        match message {
            tungstenite::Message::Text(text) => Some(Relayed::Text(text.as_str().to_string())),
            tungstenite::Message::Binary(data) => Some(Relayed::Binary(data)),
            tungstenite::Message::Close(frame) => Some(Relayed::Close(
                frame.map(|f| (u16::from(f.code), f.reason.as_str().to_string())),
            )),
            tungstenite::Message::Ping(_)
            | tungstenite::Message::Pong(_)
            | tungstenite::Message::Frame(_) => None,
        }
    }

    fn into_tungstenite(self) -> tungstenite::Message {
        match self {
            Relayed::Text(text) => tungstenite::Message::Text(text.into()),
            Relayed::Binary(data) => tungstenite::Message::Binary(data),
            Relayed::Close(frame) => tungstenite::Message::Close(frame.map(|(code, reason)| {
                tungstenite::protocol::CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                }
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_code_and_reason_survive_both_directions() {
        let from_backend = tungstenite::Message::Close(Some(tungstenite::protocol::CloseFrame {
            code: CloseCode::Library(4001),
            reason: "session expired".to_string().into(),
        }));
        let relayed = Relayed::from_tungstenite(from_backend).unwrap();
        assert_eq!(relayed, Relayed::close(4001, "session expired"));

        match relayed.into_axum() {
            ws::Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 4001);
                assert_eq!(frame.reason.as_str(), "session expired");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_missing_subprotocol_triggers_reconnect() {
        let missing = tungstenite::Error::Protocol(ProtocolError::SecWebSocketSubProtocolError(
            SubProtocolError::NoSubProtocol,
        ));
        assert!(is_missing_subprotocol(&missing));

        let invalid = tungstenite::Error::Protocol(ProtocolError::SecWebSocketSubProtocolError(
            SubProtocolError::InvalidSubProtocol,
        ));
        assert!(!is_missing_subprotocol(&invalid));
        assert!(!is_missing_subprotocol(&tungstenite::Error::ConnectionClosed));
    }

    #[test]
    fn message_type_is_preserved() {
        let binary = Relayed::from_axum(ws::Message::Binary(Bytes::from_static(&[1, 2, 3]))).unwrap();
        assert!(matches!(binary.into_tungstenite(), tungstenite::Message::Binary(ref b) if b[..] == [1, 2, 3]));

        let text = Relayed::from_tungstenite(tungstenite::Message::Text("hi".to_string().into())).unwrap();
        assert!(matches!(text.into_axum(), ws::Message::Text(ref t) if t.as_str() == "hi"));
    }

    #[test]
    fn control_frames_are_not_forwarded() {
        assert_eq!(Relayed::from_axum(ws::Message::Ping(Bytes::new())), None);
        assert_eq!(Relayed::from_tungstenite(tungstenite::Message::Pong(Bytes::new())), None);
    }

    #[test]
    fn empty_close_stays_empty() {
        assert_eq!(Relayed::from_axum(ws::Message::Close(None)), Some(Relayed::Close(None)));
        assert!(matches!(Relayed::Close(None).into_tungstenite(), tungstenite::Message::Close(None)));
    }
}
