//! Embeddable static file server with relay prefixes.
//!
//! Serves a directory over HTTP(S). Requests whose path starts with a
//! configured prefix are relayed to a named backend instead, including
//! WebSocket upgrades, with `Host`/`Origin`/`Referer` and cookie domains
//! rewritten so neither side sees the other's authority.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use pweb_relay::{config::loader::load_server_config, start, ListenConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_server_config(Path::new("./site"), None)?;
//! let server = start(config, &ListenConfig::default()).await?;
//! server.stop();
//! server.wait().await?;
//! # Ok(())
//! # }
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Rewriting primitives
pub mod cookie;
pub mod url_rewrite;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{ListenConfig, ServerConfig};
pub use http::{start, HttpServer, RunningServer, ServerError};
pub use lifecycle::Shutdown;
