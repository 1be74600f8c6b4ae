//! Request handling and transformation.
//!
//! # Responsibilities
//! - Extract the raw path (path + query) used for relay matching and backend URLs
//! - Copy inbound headers for the backend request
//! - Rewrite `Host`, `Origin` and `Referer` to the backend authority
//!
//! # Design Decisions
//! - Hop-by-hop headers are never forwarded; the client manages framing
//! - A header carrying several values is logged and skipped, except `Cookie`,
//!   whose values are joined as HTTP/2 requires

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::Uri;

use crate::config::HostEntry;
use crate::url_rewrite::replace_protocol_host_port;

/// Headers scoped to a single connection.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Path and query exactly as requested, `/` when absent.
pub fn raw_path(uri: &Uri) -> &str {
    uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
}

/// Host the client addressed, from `Host` or the request authority.
pub fn public_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> Option<&'a str> {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
}

/// Point an authority-bearing header value at `host`.
pub fn rewrite_authority(value: &HeaderValue, host: &HostEntry) -> Option<HeaderValue> {
    let text = value.to_str().ok()?;
    let port = host.effective_port().to_string();
    let rewritten = replace_protocol_host_port(text, Some(host.scheme()), &host.host, Some(&port));
    HeaderValue::from_str(&rewritten).ok()
}

/// Headers to send to `host` for a request with the given inbound headers.
pub fn forward_headers(inbound: &HeaderMap, host: &HostEntry, raw_path: &str) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.keys_len());

    for name in inbound.keys() {
        if is_hop_by_hop(name) {
            continue;
        }

        let values: Vec<&HeaderValue> = inbound.get_all(name).iter().collect();
        let value = match values.as_slice() {
            [single] => (*single).clone(),
            many if name == header::COOKIE => match join_cookie_values(many) {
                Some(joined) => joined,
                None => continue,
            },
            many => {
                tracing::warn!(
                    path = %raw_path,
                    header = %name,
                    count = many.len(),
                    "More than one header value, not forwarded"
                );
                continue;
            }
        };

        if name == header::HOST || name == header::ORIGIN || name == header::REFERER {
            match rewrite_authority(&value, host) {
                Some(rewritten) => {
                    outbound.insert(name.clone(), rewritten);
                }
                None => {
                    tracing::warn!(path = %raw_path, header = %name, "Unreadable header value, not forwarded");
                }
            }
        } else {
            outbound.insert(name.clone(), value);
        }
    }

    outbound
}

fn join_cookie_values(values: &[&HeaderValue]) -> Option<HeaderValue> {
    let parts: Option<Vec<&str>> = values.iter().map(|v| v.to_str().ok()).collect();
    HeaderValue::from_str(&parts?.join("; ")).ok()
}
