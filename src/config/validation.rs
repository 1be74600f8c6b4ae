//! Configuration validation.
//!
//! # Responsibilities
//! - Check referential integrity (relay entries reference existing hosts)
//!
//! # Design Decisions
//! - A relay entry pointing at an unknown host is dropped with a warning, not rejected
//! - Regex patterns are checked when the route table is compiled

use crate::config::schema::RouteConfig;

/// Drop relay entries whose host id has no entry in `hosts`.
///
/// Returns the removed path prefixes.
pub fn prune_dangling_relays(routes: &mut RouteConfig) -> Vec<String> {
    let mut dropped = Vec::new();
    let hosts = &routes.hosts;
    routes.relay.retain(|(prefix, host_id)| {
        if hosts.contains_key(host_id) {
            true
        } else {
            tracing::warn!(prefix = %prefix, host = %host_id, "Ignoring relay to unknown host");
            dropped.push(prefix.clone());
            false
        }
    });
    dropped
}
