//! HTTP relay to named backends.
//!
//! # Responsibilities
//! - Build the backend URL from the host entry and the raw request path
//! - Forward method, headers and a streaming body
//! - Hand the backend response to [`relay_response`]
//! - Map transport failures to a 500 carrying the failure description
//!
//! # Data Flow
//! ```text
//! client request ─▶ forward_headers ─▶ backend request ─▶ RelayClient
//!                                                            │
//! client response ◀─ relay_response ◀─────── backend response┘
//!                 ◀─ error_response ◀─────── transport error
//! ```
//!
//! # Design Decisions
//! - One attempt per request, no retries
//! - The request body is streamed to the backend as it arrives
//! - Backend error statuses are relayed like any other response

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, Uri};
use axum::response::Response;
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::{HostEntry, TimeoutConfig};
use crate::http::request::{forward_headers, public_host, raw_path};
use crate::http::response::{error_response, relay_response};
use crate::lifecycle::Shutdown;
use crate::url_rewrite::join_path;

/// Pooled HTTP(S) client used for every relayed request.
pub type RelayClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Failure to relay a request to its backend.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid backend url {url}: {source}")]
    InvalidUri {
        url: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },

    #[error("failed to build backend request: {0}")]
    Build(#[from] axum::http::Error),

    #[error("{0}")]
    Request(#[from] hyper_util::client::legacy::Error),
}

/// Build the relay client with the configured connect timeout.
pub fn build_client(timeouts: &TimeoutConfig) -> RelayClient {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));

    Client::builder(TokioExecutor::new()).build(HttpsConnector::new_with_connector(http))
}

/// Relay `request` to `host` and return the response for the client.
pub async fn forward(client: &RelayClient, shutdown: &Shutdown, request: Request<Body>, host: &HostEntry) -> Response {
    let (parts, body) = request.into_parts();
    let path = raw_path(&parts.uri).to_string();
    let public = public_host(&parts.headers, &parts.uri).map(str::to_string);

    let outbound = match backend_request(&parts, body, host, &path) {
        Ok(outbound) => outbound,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to build backend request");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    tracing::debug!(method = %parts.method, url = %outbound.uri(), "Relaying request");

    match client.request(outbound).await {
        Ok(response) => {
            tracing::debug!(path = %path, status = %response.status(), "Backend responded");
            relay_response(response, public.as_deref())
        }
        Err(e) => {
            let description = describe(&RelayError::from(e));
            if shutdown.is_triggered() {
                tracing::debug!(path = %path, error = %description, "Relay aborted during shutdown");
            } else {
                tracing::error!(path = %path, host = %host.host, error = %description, "Relay failed");
            }
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &description)
        }
    }
}

fn backend_request(
    parts: &axum::http::request::Parts,
    body: Body,
    host: &HostEntry,
    path: &str,
) -> Result<Request<Body>, RelayError> {
    let url = join_path(&host.base_url(), &[path]);
    let uri: Uri = url
        .parse()
        .map_err(|source| RelayError::InvalidUri { url: url.clone(), source })?;

    let mut builder = Request::builder().method(parts.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        *headers = forward_headers(&parts.headers, host, path);
    }
    Ok(builder.body(body)?)
}

/// Error text including the innermost cause, which names the actual failure.
fn describe(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
