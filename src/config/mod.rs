//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! served directory
//!     → loader.rs (server.json, mimetypes.json, comment stripping)
//!     → validation.rs (drop relays to unknown hosts)
//!     → ServerConfig (validated, immutable)
//!     → shared via Arc with every request handler
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Route tables keep file order because lookups are first-match

pub mod loader;
pub mod mime;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use mime::MimeTable;
pub use schema::{HostEntry, ListenConfig, RouteConfig, ServerConfig, TimeoutConfig, TlsConfig};
