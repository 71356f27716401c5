//! HTTP Server for the devcov API.
//!
//! Provides REST endpoints for CSV upload and report generation.
//! Report parameters travel in the query string, the CSV in the
//! multipart field `file`.
//!
//! # API Endpoints
//!
//! | Method | Path               | Description                                   |
//! |--------|--------------------|-----------------------------------------------|
//! | GET    | `/health`          | Health check                                  |
//! | POST   | `/api/coverage`    | `?row_field=&column_field=&mode=&order=`      |
//! | POST   | `/api/analytics`   | `?group_by=`                                  |
//! | POST   | `/api/cumulative`  | `?usage_field=&cutoff=`                       |
//! | GET    | `/api/logs`        | SSE stream for real-time logs                 |
//!
//! Every upload endpoint also accepts `delimiter` and `encoding`.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{LogBroadcaster, LogSink};
use super::types::{error_response, status_code, ParseQuery, ReportResponse};
use crate::config::EngineConfig;
use crate::error::{CsvError, PipelineError, PipelineResult, ServerError, ServerResult, SizeLimit};
use crate::models::Schema;
use crate::report::{
    run_analytics, run_coverage, run_cumulative, AnalyticsReport, AnalyticsRequest,
    CoverageReport, CoverageRequest, CumulativeReport, CumulativeRequest, ReportOutcome,
};

/// Room for multipart boundaries and part headers on top of the CSV itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EngineConfig>,
    pub schema: Arc<Schema>,
    pub logs: Arc<LogBroadcaster>,
}

impl AppState {
    pub fn new(config: EngineConfig, schema: Schema) -> Self {
        Self {
            config: Arc::new(config),
            schema: Arc::new(schema),
            logs: Arc::new(LogBroadcaster::new()),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let body_limit = match state.config.limits.max_bytes {
        Some(max) => DefaultBodyLimit::max(max.saturating_add(MULTIPART_OVERHEAD)),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/coverage", post(coverage))
        .route("/api/analytics", post(analytics))
        .route("/api/cumulative", post(cumulative))
        .route("/api/logs", get(sse_logs))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: EngineConfig, schema: Schema) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let app = router(AppState::new(config, schema));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Devcov server running on http://localhost:{}", port);
    println!("   POST /api/coverage   - Coverage matrix");
    println!("   POST /api/analytics  - Grouped analytics");
    println!("   POST /api/cumulative - Cumulative usage coverage");
    println!("   GET  /api/logs       - SSE log stream");
    println!("   GET  /health         - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (status_code(&self), Json(error_response(&self.to_string()))).into_response()
    }
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "devcov",
        "version": env!("CARGO_PKG_VERSION"),
        "schema": state.schema.identifier,
        "endpoints": {
            "coverage": "POST /api/coverage",
            "analytics": "POST /api/analytics",
            "cumulative": "POST /api/cumulative",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.logs.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn coverage(
    State(state): State<AppState>,
    Query(request): Query<CoverageRequest>,
    Query(parse): Query<ParseQuery>,
    multipart: Multipart,
) -> ServerResult<Json<ReportResponse<CoverageReport>>> {
    let bytes = read_upload(multipart, &state).await?;
    let options = state.config.engine_options(parse.to_options()?);
    run_report(state, bytes, move |bytes, schema, log| {
        run_coverage(bytes, schema, &request, &options, log)
    })
    .await
}

async fn analytics(
    State(state): State<AppState>,
    Query(request): Query<AnalyticsRequest>,
    Query(parse): Query<ParseQuery>,
    multipart: Multipart,
) -> ServerResult<Json<ReportResponse<AnalyticsReport>>> {
    let bytes = read_upload(multipart, &state).await?;
    let options = state.config.engine_options(parse.to_options()?);
    run_report(state, bytes, move |bytes, schema, log| {
        run_analytics(bytes, schema, &request, &options, log)
    })
    .await
}

async fn cumulative(
    State(state): State<AppState>,
    Query(request): Query<CumulativeRequest>,
    Query(parse): Query<ParseQuery>,
    multipart: Multipart,
) -> ServerResult<Json<ReportResponse<CumulativeReport>>> {
    let bytes = read_upload(multipart, &state).await?;
    let options = state.config.engine_options(parse.to_options()?);
    run_report(state, bytes, move |bytes, schema, log| {
        run_cumulative(bytes, schema, &request, &options, log)
    })
    .await
}

/// Pull the `file` part out of a multipart body.
async fn read_upload(mut multipart: Multipart, state: &AppState) -> ServerResult<Vec<u8>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let limit = state.config.limits.max_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, limit, "Multipart error"))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| upload_error(e, limit, "Read error"))?;
            file_data = Some(bytes.to_vec());
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;

    let log: &dyn LogSink = &*state.logs;
    log.info(format!(
        "📄 NEW UPLOAD: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));
    Ok(bytes)
}

/// A body cut off by `DefaultBodyLimit` is an oversized upload, not a malformed one.
fn upload_error(e: MultipartError, limit: Option<usize>, context: &str) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return PipelineError::Csv(CsvError::FileTooLarge(SizeLimit::Body { limit })).into();
    }
    ServerError::BadRequest(format!("{}: {}", context, e))
}

/// Run a report off the async runtime and wrap it in the response envelope.
async fn run_report<R, F>(state: AppState, bytes: Vec<u8>, run: F) -> ServerResult<Json<ReportResponse<R>>>
where
    R: Serialize + Send + 'static,
    F: FnOnce(&[u8], &Schema, &dyn LogSink) -> PipelineResult<ReportOutcome<R>> + Send + 'static,
{
    let logs = Arc::clone(&state.logs);
    let schema = Arc::clone(&state.schema);

    let outcome = tokio::task::spawn_blocking(move || run(&bytes, &schema, &*logs))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    Ok(Json(ReportResponse::from(outcome)))
}
