//! Job start requests.

use crate::error::{CoreError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/run-backtest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl BacktestRequest {
    pub fn new(symbol: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into().trim().to_ascii_uppercase(),
            start_date,
            end_date,
        }
    }

    /// Parse `YYYY-MM-DD` dates; an empty date is rejected.
    pub fn parse(symbol: &str, start_date: &str, end_date: &str) -> Result<Self> {
        let start = parse_date("start_date", start_date)?;
        let end = parse_date("end_date", end_date)?;
        let request = Self::new(symbol, start, end);
        request.validate()?;
        Ok(request)
    }

    /// Reject requests that must never reach the backend.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(CoreError::InvalidRequest("symbol is empty".to_string()));
        }
        if self.start_date >= self.end_date {
            return Err(CoreError::InvalidRequest(format!(
                "start_date {} must be before end_date {}",
                self.start_date, self.end_date
            )));
        }
        Ok(())
    }
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CoreError::InvalidRequest(format!("{field} is empty")));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| CoreError::InvalidRequest(format!("{field} '{raw}': {e}")))
}
