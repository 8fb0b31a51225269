//! HTTP client for the analysis backend.
//!
//! Thin mapping of the backend REST surface onto [`BackendApi`]. No retry
//! happens here; callers decide whether a failure is retried (polling),
//! degraded (prices), or surfaced (start, import, export).

use crate::backend::BackendApi;
use crate::error::{ApiError, ApiResult};
use crate::wire::{
    error_text, ExportPayload, ImportResponse, PriceMapResponse, SinglePriceResponse,
    StartResponse,
};
use async_trait::async_trait;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use stockwatch_core::{
    AnalysisSnapshot, BacktestRequest, BacktestStatus, BulkDataset, BulkKind, JobStatus, Price,
    StartStatus, Watchlist,
};
use tracing::{debug, info, warn};

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the analysis backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// HTTP client.
    client: Client,
    /// Backend origin, e.g. `http://localhost:8000/`.
    base_url: Url,
}

impl HttpBackend {
    /// Create a new backend client.
    ///
    /// # Arguments
    /// * `base_url` - Origin of the backend (paths are joined under it)
    /// * `timeout` - Upper bound for any single request
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| ApiError::Url(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Url(format!("{base_url}: not a base URL")));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `{base}/api/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::Url(format!("{}: not a base URL", self.base_url)))?;
            path.pop_if_empty().push("api");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Some(msg) = error_text(&body) {
                return Err(ApiError::Server(msg));
            }
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> ApiResult<T> {
        let url = self.url(segments)?;
        debug!(url = %url, "GET");
        let response = self.send(self.client.get(url)).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn start_job(&self, request: RequestBuilder, job: &str) -> ApiResult<StartStatus> {
        let body: serde_json::Value = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        if let Some(msg) = body.get("error").and_then(|v| v.as_str()) {
            return Err(ApiError::Server(msg.to_string()));
        }
        let parsed: StartResponse = serde_json::from_value(body)?;
        info!(job, status = ?parsed.status, "Job start answered");
        Ok(parsed.status)
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch_analysis(&self) -> ApiResult<AnalysisSnapshot> {
        self.get_json(&["analysis"]).await
    }

    async fn fetch_collection(&self, kind: BulkKind) -> ApiResult<BulkDataset> {
        let payload: serde_json::Value = self.get_json(&[kind.slug()]).await?;
        BulkDataset::from_payload(payload).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn fetch_watchlist(&self) -> ApiResult<Watchlist> {
        self.get_json(&["watchlist"]).await
    }

    async fn fetch_fear_greed(&self) -> ApiResult<serde_json::Value> {
        self.get_json(&["fear-greed-index"]).await
    }

    async fn run_analysis(&self) -> ApiResult<StartStatus> {
        let url = self.url(&["run-now"])?;
        self.start_job(self.client.post(url), "analysis").await
    }

    async fn analysis_status(&self) -> ApiResult<JobStatus> {
        self.get_json(&["analysis-status"]).await
    }

    async fn run_backtest(&self, request: &BacktestRequest) -> ApiResult<StartStatus> {
        let url = self.url(&["run-backtest"])?;
        self.start_job(self.client.post(url).json(request), "backtest")
            .await
    }

    async fn backtest_status(&self) -> ApiResult<BacktestStatus> {
        self.get_json(&["backtest-status"]).await
    }

    async fn fetch_prices(
        &self,
        symbols: &[String],
    ) -> ApiResult<HashMap<String, Option<Price>>> {
        let url = self.url(&["stock-prices"])?;
        let request = self
            .client
            .get(url)
            .query(&[("symbols", symbols.join(","))]);
        let body: PriceMapResponse = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            // The batch endpoint reports failures inside a 200 body.
            warn!(error = %err, "Batch price endpoint reported an error");
            if body.prices.is_empty() {
                return Err(ApiError::Server(err));
            }
        }
        Ok(body.prices)
    }

    async fn fetch_price(&self, symbol: &str) -> ApiResult<Option<Price>> {
        let body: SinglePriceResponse = self.get_json(&["stock-price", symbol]).await?;
        if let Some(err) = &body.error {
            debug!(symbol, error = %err, "Single price endpoint reported an error");
        }
        Ok(body.price)
    }

    async fn export_collection(&self, kind: BulkKind) -> ApiResult<ExportPayload> {
        let segment = format!("export-{}", kind.slug());
        let url = self.url(&[&segment])?;
        let response = self.send(self.client.get(url)).await?;
        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        info!(kind = %kind, bytes = bytes.len(), "Exported collection");
        Ok(ExportPayload {
            bytes: bytes.to_vec(),
            content_disposition,
        })
    }

    async fn import_collection(
        &self,
        kind: BulkKind,
        filename: &str,
        bytes: Vec<u8>,
    ) -> ApiResult<u64> {
        let segment = format!("import-{}", kind.slug());
        let url = self.url(&[&segment])?;
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/json")
            .map_err(|e| ApiError::HttpClient(e.to_string()))?;
        let form = Form::new().part("file", part);

        let body: ImportResponse = self
            .send(self.client.post(url).multipart(form))
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(ApiError::Server(err));
        }
        if body.status.as_deref() != Some("success") {
            return Err(ApiError::Decode(format!(
                "unexpected import status: {:?}",
                body.status
            )));
        }
        let count = body.imported_count.unwrap_or(0);
        info!(kind = %kind, imported = count, "Imported collection");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_under_base_path() {
        let backend = HttpBackend::new("http://localhost:8000/proxy", DEFAULT_TIMEOUT).unwrap();
        let url = backend.url(&["analysis-status"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/proxy/api/analysis-status");
    }

    #[test]
    fn test_url_encodes_symbol_segment() {
        let backend = HttpBackend::new("http://localhost:8000", DEFAULT_TIMEOUT).unwrap();
        let url = backend.url(&["stock-price", "BRK/B"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/stock-price/BRK%2FB");
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(HttpBackend::new("mailto:someone@example.com", DEFAULT_TIMEOUT).is_err());
        assert!(HttpBackend::new("not a url", DEFAULT_TIMEOUT).is_err());
    }
}
