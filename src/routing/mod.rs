//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (relay prefix lookup)          → RelayTarget or None
//!     → static_resolver.rs (redirect / file / mapping) → Resolution
//!
//! Compilation (at startup):
//!     RouteConfig
//!     → matcher.rs (prefix matchers, compiled regex rules)
//!     → frozen Router + StaticResolver
//! ```
//!
//! # Design Decisions
//! - Tables compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same rule
//! - First match wins, in file order

pub mod matcher;
pub mod router;
pub mod static_resolver;

pub use router::{RelayTarget, Router};
pub use static_resolver::{Resolution, StaticResolver};
