//! Analysis and watchlist read models.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display format for the "last updated" timestamp.
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Snapshot returned by `GET /api/analysis`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub analysis_date: Option<String>,
    #[serde(default)]
    pub total_stocks: Option<u64>,
    #[serde(default)]
    pub analyzed_stocks: Option<u64>,
    #[serde(default)]
    pub result: Option<Vec<Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalysisSnapshot {
    /// Number of ranked stocks in the result, if any.
    pub fn result_len(&self) -> usize {
        self.result.as_ref().map_or(0, Vec::len)
    }

    /// The single display timestamp derived from the optional source fields.
    ///
    /// Precedence: `timestamp` (rendered in local time), then `analysis_date`
    /// verbatim, then `now` when a result exists. `None` leaves the previous
    /// display value in place.
    pub fn display_timestamp(&self, now: DateTime<Local>) -> Option<String> {
        if let Some(ts) = self.timestamp.as_deref().filter(|s| !s.trim().is_empty()) {
            return Some(format_timestamp(ts));
        }
        if let Some(date) = self
            .analysis_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            return Some(date.to_string());
        }
        if self.result.is_some() {
            return Some(now.format(DISPLAY_TIME_FORMAT).to_string());
        }
        None
    }
}

/// Render an RFC 3339 or naive ISO timestamp in local time.
///
/// Unparseable input is returned unchanged.
fn format_timestamp(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Local).format(DISPLAY_TIME_FORMAT).to_string();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return naive.format(DISPLAY_TIME_FORMAT).to_string();
        }
    }
    raw.to_string()
}

/// Watchlist returned by `GET /api/watchlist`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Watchlist {
    #[serde(default)]
    pub stocks: Vec<String>,
    #[serde(default)]
    pub settings: Value,
}
