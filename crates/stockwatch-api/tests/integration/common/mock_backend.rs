//! Mock analysis backend for integration tests.
//!
//! Serves canned JSON for the REST endpoints and records:
//! - every request path
//! - uploaded import files (field name, filename, bytes)

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};

/// One multipart part received by an import endpoint.
#[derive(Debug, Clone)]
pub struct Upload {
    pub field: String,
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Canned responses, editable while the server runs.
#[derive(Default)]
pub struct Canned {
    pub start_status: Option<&'static str>,
    /// `{"error": ...}` answered to start requests with a 200.
    pub start_error: Option<&'static str>,
    pub analysis_statuses: VecDeque<Value>,
    pub backtest_statuses: VecDeque<Value>,
    pub prices: HashMap<String, Value>,
    pub batch_unavailable: bool,
    pub export_body: Value,
    pub export_disposition: Option<&'static str>,
    /// `{"error": ...}` answered to imports with a 400.
    pub import_error: Option<&'static str>,
}

#[derive(Default)]
struct Shared {
    canned: Mutex<Canned>,
    paths: Mutex<Vec<String>>,
    uploads: Mutex<Vec<Upload>>,
    backtest_requests: Mutex<Vec<Value>>,
}

/// A mock backend for testing.
pub struct MockBackend {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    shared: Arc<Shared>,
}

impl MockBackend {
    /// Start a new mock backend on an available port.
    pub async fn start(canned: Canned) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared {
            canned: Mutex::new(canned),
            ..Default::default()
        });
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let router = Router::new()
            .route("/api/run-now", post(run_now))
            .route("/api/run-backtest", post(run_backtest))
            .route("/api/analysis-status", get(analysis_status))
            .route("/api/backtest-status", get(backtest_status))
            .route("/api/stock-prices", get(stock_prices))
            .route("/api/stock-price/{symbol}", get(stock_price))
            .route("/api/export-monitored-stocks", get(export))
            .route("/api/export-trade-history", get(export))
            .route("/api/import-monitored-stocks", post(import))
            .route("/api/import-trade-history", post(import))
            .with_state(shared.clone());

        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await;
                })
                .await;
        });

        Self {
            addr,
            shutdown_tx,
            shared,
        }
    }

    /// Get the server's base URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get all request paths (with query strings) received so far.
    pub async fn paths(&self) -> Vec<String> {
        self.shared.paths.lock().await.clone()
    }

    pub async fn uploads(&self) -> Vec<Upload> {
        self.shared.uploads.lock().await.clone()
    }

    pub async fn backtest_requests(&self) -> Vec<Value> {
        self.shared.backtest_requests.lock().await.clone()
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn record(shared: &Shared, path: String) {
    shared.paths.lock().await.push(path);
}

async fn start_answer(shared: &Shared) -> Json<Value> {
    let canned = shared.canned.lock().await;
    if let Some(err) = canned.start_error {
        return Json(json!({ "error": err }));
    }
    Json(json!({ "status": canned.start_status.unwrap_or("started") }))
}

async fn run_now(State(shared): State<Arc<Shared>>) -> Json<Value> {
    record(&shared, "/api/run-now".to_string()).await;
    start_answer(&shared).await
}

async fn run_backtest(State(shared): State<Arc<Shared>>, Json(body): Json<Value>) -> Json<Value> {
    record(&shared, "/api/run-backtest".to_string()).await;
    shared.backtest_requests.lock().await.push(body);
    start_answer(&shared).await
}

async fn analysis_status(State(shared): State<Arc<Shared>>) -> Json<Value> {
    record(&shared, "/api/analysis-status".to_string()).await;
    let mut canned = shared.canned.lock().await;
    Json(canned.analysis_statuses.pop_front().unwrap_or(Value::Null))
}

async fn backtest_status(State(shared): State<Arc<Shared>>) -> Json<Value> {
    record(&shared, "/api/backtest-status".to_string()).await;
    let mut canned = shared.canned.lock().await;
    Json(canned.backtest_statuses.pop_front().unwrap_or(Value::Null))
}

async fn stock_prices(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let symbols = query.get("symbols").cloned().unwrap_or_default();
    record(&shared, format!("/api/stock-prices?symbols={symbols}")).await;
    let canned = shared.canned.lock().await;
    if canned.batch_unavailable {
        return (StatusCode::SERVICE_UNAVAILABLE, "upstream quote service down").into_response();
    }
    let prices: serde_json::Map<String, Value> = symbols
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| (s.to_string(), canned.prices.get(s).cloned().unwrap_or(Value::Null)))
        .collect();
    Json(json!({ "prices": prices })).into_response()
}

async fn stock_price(State(shared): State<Arc<Shared>>, Path(symbol): Path<String>) -> Response {
    record(&shared, format!("/api/stock-price/{symbol}")).await;
    let canned = shared.canned.lock().await;
    match canned.prices.get(&symbol) {
        Some(price) => Json(json!({ "symbol": symbol, "price": price })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no quote for {symbol}") })),
        )
            .into_response(),
    }
}

async fn export(State(shared): State<Arc<Shared>>) -> Response {
    record(&shared, "/api/export".to_string()).await;
    let canned = shared.canned.lock().await;
    let body = serde_json::to_vec(&canned.export_body).unwrap();
    match canned.export_disposition {
        Some(disposition) => (
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            body,
        )
            .into_response(),
        None => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
    }
}

async fn import(State(shared): State<Arc<Shared>>, mut multipart: Multipart) -> Response {
    record(&shared, "/api/import".to_string()).await;
    let mut records = 0u64;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.unwrap_or_default().to_vec();
        if let Ok(Value::Array(items)) = serde_json::from_slice::<Value>(&bytes) {
            records = items.len() as u64;
        }
        shared.uploads.lock().await.push(Upload {
            field: name,
            filename,
            bytes,
        });
    }

    let canned = shared.canned.lock().await;
    if let Some(err) = canned.import_error {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": err }))).into_response();
    }
    Json(json!({ "status": "success", "imported_count": records })).into_response()
}
