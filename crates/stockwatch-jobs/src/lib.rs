//! Status polling and job orchestration.
//!
//! Long-running backend jobs (the daily analysis and single-symbol
//! backtests) are triggered with one request and then observed by polling:
//! - `poller`: fixed-interval polling with single-handle ownership
//! - `driver`: per-job start/status/terminal rules
//! - `orchestrator`: the client-side state machine around one job class

pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod poller;

pub use driver::{AnalysisJob, BacktestJob, JobDriver, StatusLine, TickOutcome};
pub use error::{JobError, JobResult};
pub use orchestrator::{
    CompletionHook, JobOrchestrator, JobSettings, JobView, ALREADY_RUNNING_MESSAGE,
};
pub use poller::{PollerHandle, StatusPoller};
