//! Prometheus metrics and structured logging for stockwatch.
//!
//! - Prometheus metrics for job polling, state transitions, price lookups
//!   and bulk transfers
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
