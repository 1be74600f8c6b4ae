//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with key/value fields
//!     → request spans from tower-http's TraceLayer, tagged with x-request-id
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//! ```

pub mod logging;

pub use logging::init_logging;
