//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, dispatch)
//!     → websocket.rs (upgrade on a relay prefix, tunnel to the backend)
//!     → relay.rs (plain request on a relay prefix)
//!         → request.rs (headers for the backend)
//!         → response.rs (status, headers, cookies back to the client)
//!     → static_files.rs (everything else)
//!     → Send to client
//! ```

pub mod relay;
pub mod request;
pub mod response;
pub mod server;
pub mod static_files;
pub mod websocket;

pub use relay::{RelayClient, RelayError};
pub use server::{start, AppState, HttpServer, RunningServer, ServerError};
pub use websocket::TunnelError;
