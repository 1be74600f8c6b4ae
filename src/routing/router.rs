//! Relay lookup.
//!
//! # Responsibilities
//! - Store compiled relay prefixes in configured order
//! - Resolve a raw request path to the backend that should receive it
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan, first match wins
//! - Explicit `None` rather than a silent default backend

use std::collections::HashMap;

use crate::config::{HostEntry, RouteConfig};
use crate::routing::matcher::PathPrefixMatcher;

/// A relay prefix that matched, with its backend.
#[derive(Debug, Clone, Copy)]
pub struct RelayTarget<'a> {
    pub prefix: &'a str,
    pub host_id: &'a str,
    pub host: &'a HostEntry,
}

/// Compiled relay table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    relays: Vec<PathPrefixMatcher>,
    hosts: HashMap<String, HostEntry>,
}

impl Router {
    /// Build from the relay and host tables.
    ///
    /// Entries naming an unknown host are skipped.
    pub fn from_config(routes: &RouteConfig) -> Self {
        let relays = routes
            .relay
            .iter()
            .filter(|(_, host_id)| routes.hosts.contains_key(host_id))
            .map(|(prefix, host_id)| PathPrefixMatcher::new(prefix.as_str(), host_id.as_str()))
            .collect();

        Self {
            relays,
            hosts: routes.hosts.clone(),
        }
    }

    /// Find the first relay whose prefix starts `raw_path`.
    pub fn match_relay(&self, raw_path: &str) -> Option<RelayTarget<'_>> {
        self.relays.iter().find(|m| m.matches(raw_path)).and_then(|m| {
            self.hosts.get(m.host_id()).map(|host| RelayTarget {
                prefix: m.prefix(),
                host_id: m.host_id(),
                host,
            })
        })
    }

    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }
}
