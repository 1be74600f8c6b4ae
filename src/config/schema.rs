//! Configuration schema definitions.
//!
//! This module defines the configuration structures for the server. The
//! route tables deserialize from `server.json`; listener and timeout settings
//! are assembled by the embedding process.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::mime::MimeTable;

/// A named backend target.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostEntry {
    /// `http` or `https`.
    pub protocol: String,

    /// Backend host name or address.
    pub host: String,

    /// Backend port; 0 falls back to 80.
    pub port: u16,
}

impl Default for HostEntry {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: String::new(),
            port: 80,
        }
    }
}

impl HostEntry {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
        }
    }

    /// Scheme used for HTTP relaying.
    pub fn scheme(&self) -> &str {
        if self.protocol.trim().is_empty() {
            "http"
        } else {
            &self.protocol
        }
    }

    /// Port used to reach the backend.
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            80
        } else {
            self.port
        }
    }

    /// `protocol://host:port` without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.effective_port())
    }

    /// WebSocket scheme mirroring the HTTP scheme (`https` → `wss`).
    pub fn websocket_scheme(&self) -> &'static str {
        if self.scheme().ends_with('s') {
            "wss"
        } else {
            "ws"
        }
    }

    /// `ws(s)://host:port` without a trailing slash.
    pub fn websocket_base_url(&self) -> String {
        format!("{}://{}:{}", self.websocket_scheme(), self.host, self.effective_port())
    }
}

/// Route tables loaded from `server.json`.
///
/// `redirect`, `mapping` and `relay` keep the order in which they appear in
/// the file; lookups are first-match.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RouteConfig {
    /// Regex pattern → redirect location template.
    #[serde(with = "ordered_pairs")]
    pub redirect: Vec<(String, String)>,

    /// Regex pattern → file path template, tried when a direct file lookup misses.
    #[serde(with = "ordered_pairs")]
    pub mapping: Vec<(String, String)>,

    /// Literal path prefix → host id.
    #[serde(with = "ordered_pairs")]
    pub relay: Vec<(String, String)>,

    /// Host id → backend.
    pub hosts: HashMap<String, HostEntry>,
}

/// TLS configuration for a secure listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ListenConfig {
    /// Addresses to bind; each becomes one `scheme://address:port/` prefix.
    pub addresses: Vec<String>,

    /// Explicit port. When absent, see [`ListenConfig::port`].
    pub port: Option<u16>,

    /// Serve HTTPS instead of HTTP.
    pub secure: bool,

    /// Allowed to bind privileged ports and all interfaces.
    pub privileged: bool,

    /// Required when `secure` is set.
    pub tls: Option<TlsConfig>,
}

impl ListenConfig {
    /// Configured port, or 443/80 when privileged, else 8080.
    pub fn port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.privileged && self.secure => 443,
            None if self.privileged => 80,
            None => 8080,
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// Addresses to bind, defaulting to all interfaces when privileged, else localhost.
    pub fn bind_addresses(&self) -> Vec<String> {
        if !self.addresses.is_empty() {
            return self.addresses.clone();
        }
        let default = if self.privileged { "0.0.0.0" } else { "localhost" };
        vec![default.to_string()]
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for a response head in seconds.
    pub request_secs: u64,

    /// How long `stop` waits for in-flight connections in seconds.
    pub stop_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 300,
            stop_grace_secs: 5,
        }
    }
}

/// Everything a running server reads. Built once, shared via `Arc`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Root of the static content.
    pub served_dir: PathBuf,

    pub routes: RouteConfig,

    pub mime_types: MimeTable,

    pub timeouts: TimeoutConfig,
}

impl ServerConfig {
    /// Configuration with empty route tables and no MIME overrides.
    pub fn new(served_dir: impl Into<PathBuf>) -> Self {
        Self {
            served_dir: served_dir.into(),
            routes: RouteConfig::default(),
            mime_types: MimeTable::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// (De)serializes a JSON object as an ordered list of string pairs.
mod ordered_pairs {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(pairs: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(pairs.iter().map(|(k, v)| (k, v)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of string values")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, String>()? {
                    pairs.push(entry);
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}
