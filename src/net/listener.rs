//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind one listener per configured address
//! - Map wildcard addresses (`+`, `*`) to all interfaces
//! - Hand bound listeners to the HTTP server
//!
//! # Design Decisions
//! - Every address binds separately; one failure aborts the whole start
//! - Host names are resolved at bind time, the first resolved address wins

use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
#[error("failed to bind {address}: {source}")]
pub struct ListenerError {
    pub address: String,
    #[source]
    pub source: std::io::Error,
}

/// A bound listener and the prefix it serves.
#[derive(Debug)]
pub struct BoundListener {
    pub prefix: String,
    pub local_addr: SocketAddr,
    pub listener: TcpListener,
}

/// Host part to bind for a configured address.
pub fn bind_host(address: &str) -> &str {
    match address {
        "+" | "*" => "0.0.0.0",
        other => other.trim_start_matches('[').trim_end_matches(']'),
    }
}

/// Bind `address:port`.
pub async fn bind(address: &str, port: u16, scheme: &str) -> Result<BoundListener, ListenerError> {
    let prefix = format!("{}://{}:{}/", scheme, address, port);
    let error = |source| ListenerError {
        address: format!("{}:{}", address, port),
        source,
    };

    let listener = TcpListener::bind((bind_host(address), port)).await.map_err(error)?;
    let local_addr = listener.local_addr().map_err(error)?;

    tracing::info!(prefix = %prefix, address = %local_addr, "Listener bound");

    Ok(BoundListener {
        prefix,
        local_addr,
        listener,
    })
}
