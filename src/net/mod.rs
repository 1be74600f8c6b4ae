//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenConfig
//!     → listener.rs (bind each address, non-blocking std listener)
//!     → tls.rs (optional certificate loading for secure listeners)
//!     → Hand off to HTTP layer
//!
//! WebSocket upgrade
//!     → connection.rs (tunnel id, live tunnel count)
//! ```

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{bind, BoundListener, ListenerError};
