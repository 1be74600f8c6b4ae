//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     stop() / signal → cancel token → accept loops stop, tunnels close → exit
//!
//! Signals (signals.rs):
//!     SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One process-wide token; each tunnel runs on a child token
//! - Shutdown has a timeout: connections still open after the grace period are dropped

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
