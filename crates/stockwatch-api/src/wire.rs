//! Wire-level request/response bodies that do not surface as domain types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use stockwatch_core::{Price, StartStatus};

/// Response of `POST /api/run-now` and `POST /api/run-backtest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: StartStatus,
}

/// Response of `GET /api/stock-prices`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceMapResponse {
    #[serde(default)]
    pub prices: HashMap<String, Option<Price>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `GET /api/stock-price/:symbol`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SinglePriceResponse {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `POST /api/import-*`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub imported_count: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Raw export download: bytes plus the server's filename hint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportPayload {
    pub bytes: Vec<u8>,
    pub content_disposition: Option<String>,
}

/// Extract the backend's error text from an error response body.
///
/// FastAPI-style backends answer `{"error": "..."}` or `{"detail": "..."}`;
/// `detail` may also be a list of validation objects with a `msg` field.
pub fn error_text(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if let Some(msg) = value.get("error").and_then(|v| v.as_str()) {
        return Some(msg.to_string());
    }
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            (!msgs.is_empty()).then(|| msgs.join("; "))
        }
        _ => None,
    }
}
