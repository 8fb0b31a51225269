//! Whole-collection datasets exchanged as opaque JSON snapshots.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Object keys under which the backend may wrap a collection array.
const WRAPPER_KEYS: &[&str] = &[
    "stocks",
    "monitored_stocks",
    "trades",
    "trade_history",
    "records",
    "data",
];

/// The two bulk collections the backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkKind {
    MonitoredStocks,
    TradeHistory,
}

impl BulkKind {
    pub const ALL: [BulkKind; 2] = [BulkKind::MonitoredStocks, BulkKind::TradeHistory];

    /// Path segment used by the read, export and import endpoints.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::MonitoredStocks => "monitored-stocks",
            Self::TradeHistory => "trade-history",
        }
    }

    /// Download name used when the server gives no filename hint.
    pub fn default_filename(&self) -> &'static str {
        match self {
            Self::MonitoredStocks => "monitored_stocks.json",
            Self::TradeHistory => "trade_history.json",
        }
    }
}

impl fmt::Display for BulkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for BulkKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monitored" | "monitored-stocks" | "monitored_stocks" | "stocks" => {
                Ok(Self::MonitoredStocks)
            }
            "trades" | "trade-history" | "trade_history" | "history" => Ok(Self::TradeHistory),
            other => Err(CoreError::InvalidDataset(format!(
                "unknown collection: {other}"
            ))),
        }
    }
}

/// Ordered records of one bulk collection.
///
/// Records are kept as raw JSON values; their shape belongs to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BulkDataset {
    pub records: Vec<Value>,
}

impl BulkDataset {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    /// Accepts a bare array, or an object wrapping exactly one known array key.
    pub fn from_payload(payload: Value) -> Result<Self> {
        match payload {
            Value::Array(records) => Ok(Self { records }),
            Value::Object(mut map) => {
                for key in WRAPPER_KEYS {
                    if let Some(Value::Array(records)) = map.remove(*key) {
                        return Ok(Self { records });
                    }
                }
                Err(CoreError::InvalidDataset(
                    "object payload has no collection array".to_string(),
                ))
            }
            Value::Null => Ok(Self::default()),
            other => Err(CoreError::InvalidDataset(format!(
                "expected array or object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let payload: Value = serde_json::from_slice(bytes)?;
        Self::from_payload(payload)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Symbols of the records, in order, without duplicates.
    ///
    /// A record is either a bare symbol string or an object with a
    /// `symbol` field.
    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let symbol = match record {
                Value::String(s) => Some(s.as_str()),
                Value::Object(map) => map.get("symbol").and_then(Value::as_str),
                _ => None,
            };
            if let Some(s) = symbol.map(str::trim).filter(|s| !s.is_empty()) {
                if !out.iter().any(|existing| existing == s) {
                    out.push(s.to_string());
                }
            }
        }
        out
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_bare_array() {
        let ds = BulkDataset::from_payload(json!([{"symbol": "AAPL"}, {"symbol": "TSLA"}]))
            .unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.symbols(), vec!["AAPL", "TSLA"]);
    }

    #[test]
    fn test_from_wrapped_object() {
        let ds = BulkDataset::from_payload(json!({"trades": [{"id": 1}], "count": 1})).unwrap();
        assert_eq!(ds.records, vec![json!({"id": 1})]);
    }

    #[test]
    fn test_from_unknown_object_fails() {
        assert!(BulkDataset::from_payload(json!({"rows": 3})).is_err());
        assert!(BulkDataset::from_payload(json!(42)).is_err());
    }

    #[test]
    fn test_null_is_empty() {
        assert!(BulkDataset::from_payload(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_symbols_dedup_and_strings() {
        let ds = BulkDataset::new(vec![
            json!("NVDA"),
            json!({"symbol": " NVDA "}),
            json!({"name": "no symbol"}),
            json!({"symbol": "AMD"}),
        ]);
        assert_eq!(ds.symbols(), vec!["NVDA", "AMD"]);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("monitored".parse::<BulkKind>().unwrap(), BulkKind::MonitoredStocks);
        assert_eq!("Trades".parse::<BulkKind>().unwrap(), BulkKind::TradeHistory);
        assert!("positions".parse::<BulkKind>().is_err());
        assert_eq!(BulkKind::TradeHistory.slug(), "trade-history");
    }
}
