//! Core domain types for the stockwatch client.
//!
//! This crate provides the types shared by every layer of the client:
//! - `ProcessingState`: Presentation-facing job state
//! - `JobStatus`, `BacktestStatus`: Polled status payloads
//! - `PriceEntry`, `Price`: Per-symbol price resolution
//! - `BulkKind`, `BulkDataset`: Whole-collection snapshots
//! - `AnalysisSnapshot`: The analysis read model
//! - `BacktestRequest`: Validated backtest parameters

pub mod analysis;
pub mod bulk;
pub mod decimal;
pub mod error;
pub mod price;
pub mod request;
pub mod state;
pub mod status;

pub use analysis::{AnalysisSnapshot, Watchlist};
pub use bulk::{BulkDataset, BulkKind};
pub use decimal::Price;
pub use error::{CoreError, Result};
pub use price::{PriceEntry, UNAVAILABLE};
pub use request::BacktestRequest;
pub use state::ProcessingState;
pub use status::{BacktestStatus, JobStatus, StartStatus, ANALYSIS_DONE_STAGE};
