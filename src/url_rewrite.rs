//! URL and authority string rewriting.
//!
//! Pure string helpers used by the relay and the WebSocket tunnel so the
//! backend never sees the public-facing authority.

/// Join path segments with exactly one `/` at every boundary.
///
/// Empty segments are skipped.
pub fn join_path(base: &str, segments: &[&str]) -> String {
    let mut joined = base.to_string();
    for segment in segments.iter().filter(|s| !s.is_empty()) {
        match (joined.ends_with('/'), segment.starts_with('/')) {
            (true, true) => joined.push_str(segment.trim_start_matches('/')),
            (false, false) => {
                joined.push('/');
                joined.push_str(segment);
            }
            _ => joined.push_str(segment),
        }
    }
    joined
}

/// Split an optional `scheme://` prefix off a URL.
fn split_scheme(url: &str) -> (Option<&str>, &str) {
    match url.find("://") {
        Some(pos) => (Some(&url[..pos]), &url[pos + 3..]),
        None => (None, url),
    }
}

/// Split the authority from whatever follows it (path, query or fragment).
fn split_authority(rest: &str) -> (&str, &str) {
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    rest.split_at(end)
}

/// Replace scheme, host and port of an absolute or relative URL.
///
/// - An existing scheme is replaced by `protocol`, or dropped when `protocol` is `None`.
///   A URL without a scheme never gains one.
/// - The host is always replaced.
/// - A blank or missing `port` removes any port; otherwise it is set.
/// - Path, query and fragment after the authority are preserved.
pub fn replace_protocol_host_port(
    url: &str,
    protocol: Option<&str>,
    host: &str,
    port: Option<&str>,
) -> String {
    let (scheme, rest) = split_scheme(url);
    let (_, tail) = split_authority(rest);

    let mut out = String::with_capacity(url.len() + host.len());
    if let (Some(_), Some(protocol)) = (scheme, protocol) {
        out.push_str(protocol);
        out.push_str("://");
    }
    out.push_str(host);
    if let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) {
        out.push(':');
        out.push_str(port);
    }
    out.push_str(tail);
    out
}

/// Extract the bare hostname from a `Host`-style value, dropping scheme, credentials and port.
pub fn host_only(value: &str) -> String {
    let (_, rest) = split_scheme(value.trim());
    let (authority, _) = split_authority(rest);
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);

    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(end) => authority[..=end].to_string(),
            None => authority.to_string(),
        };
    }
    authority
        .split_once(':')
        .map_or(authority, |(host, _)| host)
        .to_string()
}
