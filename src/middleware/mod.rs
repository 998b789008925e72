//! # HTTP Middleware
//!
//! Both middlewares wrap every route, including the 404 fallback.
//!
//! ## Ordering:
//! actix runs the last `.wrap()` first, so `main.rs` registers metrics before
//! logging. Logging is outermost: it sees the final status and attaches the
//! `x-request-id` header after everything else has run.

pub mod logging;
pub mod metrics;

pub use logging::{RequestId, RequestLogging};
pub use metrics::MetricsMiddleware;
