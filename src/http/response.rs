//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn a backend response into the client response
//! - Set every relayed cookie's `Domain` to the host the client addressed
//! - Build error responses whose reason phrase carries the failure description
//!
//! # Design Decisions
//! - Backend bodies are streamed, never buffered
//! - Status, reason phrase and headers are copied for every backend status,
//!   error statuses included
//! - Cookies that fail to parse are dropped rather than forwarded verbatim

use axum::body::Body;
use axum::http::header::{self, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;

use crate::cookie::{parse_set_cookie, split_combined_set_cookie};
use crate::http::request::is_hop_by_hop;
use crate::url_rewrite::host_only;

/// Build the client response from a backend response.
///
/// `public_host` is the `Host` the client used; every cookie gets it as `Domain`.
pub fn relay_response(backend: hyper::Response<Incoming>, public_host: Option<&str>) -> Response {
    let (mut parts, body) = backend.into_parts();

    let cookies: Vec<HeaderValue> = parts.headers.get_all(header::SET_COOKIE).iter().cloned().collect();
    parts.headers.remove(header::SET_COOKIE);

    let hop_by_hop: Vec<_> = parts.headers.keys().filter(|name| is_hop_by_hop(name)).cloned().collect();
    for name in hop_by_hop {
        parts.headers.remove(name);
    }

    let domain = public_host.map(host_only).filter(|h| !h.is_empty());
    for raw in &cookies {
        let Ok(raw) = raw.to_str() else {
            tracing::warn!("Dropping non-text Set-Cookie header");
            continue;
        };
        for value in rewrite_set_cookie(raw, domain.as_deref()) {
            parts.headers.append(header::SET_COOKIE, value);
        }
    }

    Response::from_parts(parts, Body::new(body))
}

/// Split, re-domain and re-serialize one `Set-Cookie` header value.
///
/// With a `domain`, each cookie's `Domain` is set to it, added when missing.
pub fn rewrite_set_cookie(raw: &str, domain: Option<&str>) -> Vec<HeaderValue> {
    split_combined_set_cookie(raw)
        .into_iter()
        .filter_map(|part| match parse_set_cookie(&part) {
            Ok(mut cookie) => {
                if let Some(domain) = domain {
                    cookie.domain = Some(domain.to_string());
                }
                HeaderValue::from_str(&cookie.to_set_cookie()).ok()
            }
            Err(e) => {
                tracing::warn!(cookie = %part, error = %e, "Dropping unparseable Set-Cookie");
                None
            }
        })
        .collect()
}

/// Error response with `description` as reason phrase and plain-text body.
pub fn error_response(status: StatusCode, description: &str) -> Response {
    let mut response = (status, description.to_string()).into_response();
    if let Some(reason) = reason_phrase(description) {
        response.extensions_mut().insert(reason);
    }
    response
}

/// Reason phrase restricted to visible ASCII, or `None` when nothing is left.
pub fn reason_phrase(description: &str) -> Option<ReasonPhrase> {
    let sanitized: String = description
        .chars()
        .map(|c| if c == ' ' || c.is_ascii_graphic() { c } else { ' ' })
        .collect();
    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        return None;
    }
    ReasonPhrase::try_from(trimmed.to_string()).ok()
}
