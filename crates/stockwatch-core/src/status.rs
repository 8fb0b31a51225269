//! Polled job status payloads.
//!
//! Both payloads are produced by the backend and are read-only on the
//! client. Field aliases cover the spellings the backend has used over time.

use serde::{Deserialize, Deserializer, Serialize};

/// Stage label the analysis backend reports once a run has finished.
///
/// The backend contract has no explicit terminal flag; completion is only
/// recognizable by this localized stage string ("done").
pub const ANALYSIS_DONE_STAGE: &str = "完成";

/// Answer to a job-start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    /// The backend accepted the job.
    Started,
    /// A job of this class is already running server-side.
    AlreadyRunning,
    /// Any other status string.
    #[serde(other)]
    Unknown,
}

/// Status of the daily analysis job (`GET /api/analysis-status`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub is_running: bool,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub current_stage: String,
    /// Progress in percent, clamped to `[0, 100]`.
    #[serde(default, alias = "progress_percent", deserialize_with = "de_progress")]
    pub progress: u8,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub message: String,
    #[serde(default, alias = "start_time")]
    pub started_at: Option<String>,
    #[serde(default, alias = "end_time")]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl JobStatus {
    /// Whether the analysis run reached its done stage.
    pub fn is_done_stage(&self) -> bool {
        self.current_stage.trim() == ANALYSIS_DONE_STAGE
    }

    /// Whether the run finished successfully.
    ///
    /// The done stage is the primary signal. A stopped run that carries a
    /// result counts as finished too, whatever its stage label says.
    pub fn is_finished(&self) -> bool {
        self.error.is_none()
            && (self.is_done_stage() || (!self.is_running && self.result.is_some()))
    }

    /// Whether this status will not change any further.
    pub fn is_terminal(&self) -> bool {
        self.error.is_some() || self.is_finished()
    }
}

/// Status of the backtest job (`GET /api/backtest-status`).
///
/// `logs` is cumulative: every poll carries the full log so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestStatus {
    #[serde(default)]
    pub is_running: bool,
    #[serde(default, deserialize_with = "de_progress")]
    pub progress: u8,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub current_step: String,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub message: String,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BacktestStatus {
    pub fn is_terminal(&self) -> bool {
        !self.is_running
    }
}

fn de_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(match raw {
        Some(v) if v.is_finite() => v.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    })
}

fn de_string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
