//! HTTP surface: `POST /analyze_layout/` and `GET /health`.
//!
//! The handler walks a request through three states:
//!
//! ```text
//! Validating ──▶ Processing ──▶ Responding
//!     │              │
//!     └─ 400/422     └─ 500
//! ```
//!
//! Validation only looks at the multipart field and the file name, so a
//! rejected upload never touches the disk. Processing owns a
//! [`ScopedWorkspace`] that is removed on every exit path.

use crate::config::{PageRange, ParseMethod, ParseOptions, ServiceConfig};
use crate::error::LayoutError;
use crate::output::{AnalysisResult, AnalyzeResponse};
use crate::pipeline::parse::parse_document;
use crate::pipeline::{blocking, Backend};
use crate::upload::{validate_extension, ScopedWorkspace};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Name of the multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

/// Process-wide state shared by every request. Never mutated.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub backend: Backend,
}

impl AppState {
    pub fn new(config: ServiceConfig, backend: Backend) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_parse_method() -> String {
    ParseMethod::Auto.as_str().to_string()
}

/// Query string of `POST /analyze_layout/`.
///
/// `parse_method` stays a string here: an unknown method is a processing
/// failure, not a malformed request. A negative `end_page_id` means "to the
/// end of the document", like an absent one.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeQuery {
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_parse_method")]
    pub parse_method: String,
    #[serde(default)]
    pub start_page_id: usize,
    #[serde(default)]
    pub end_page_id: Option<i64>,
}

impl AnalyzeQuery {
    pub fn page_range(&self) -> PageRange {
        let end = self.end_page_id.and_then(|e| usize::try_from(e).ok());
        PageRange::new(self.start_page_id, end)
    }
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// An error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<LayoutError> for ApiError {
    fn from(err: LayoutError) -> Self {
        if err.is_client_error() {
            ApiError::new(StatusCode::BAD_REQUEST, err.to_string())
        } else {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error in layout service: {err}"),
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

/// Build the router with every route and middleware layer.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/analyze_layout/", post(analyze_layout))
        .route("/analyze_layout", post(analyze_layout))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(map_response(payload_too_large_as_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn serve(config: ServiceConfig, backend: Backend) -> Result<(), LayoutError> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LayoutError::Internal(format!("cannot bind {addr}: {e}")))?;
    info!("{} v{} listening on {}", config.title, env!("CARGO_PKG_VERSION"), addr);

    axum::serve(listener, router(AppState::new(config, backend)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| LayoutError::Internal(format!("server error: {e}")))
}

/// `RequestBodyLimitLayer` answers 413 in plain text; give it the JSON
/// error body every other failure has.
async fn payload_too_large_as_json(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body exceeds the upload size limit",
        )
        .into_response();
    }
    response
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": state.config.title,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn analyze_layout(
    State(state): State<AppState>,
    query: Result<Query<AnalyzeQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    // ── Validating ───────────────────────────────────────────────────────
    let Query(query) = query?;
    let mut multipart = multipart?;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), format!("Failed to read multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // A plain form value is not an upload.
        let Some(filename) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
        else {
            continue;
        };
        validate_extension(&filename)?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(e.status(), format!("Failed to read file data: {e}")))?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) = upload.ok_or_else(|| {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Missing required form field '{FILE_FIELD}'"),
        )
    })?;
    debug!("Accepted upload '{}' ({} bytes)", filename, bytes.len());

    // ── Processing ───────────────────────────────────────────────────────
    match process_upload(&state, &query, &filename, &bytes).await {
        // ── Responding ───────────────────────────────────────────────────
        Ok(analysis_results) => Ok(Json(AnalyzeResponse {
            filename,
            analysis_results,
        })),
        Err(e) => {
            error!(filename = %filename, "Error processing file: {}", e);
            Err(e.into())
        }
    }
}

async fn process_upload(
    state: &AppState,
    query: &AnalyzeQuery,
    filename: &str,
    bytes: &[u8],
) -> Result<AnalysisResult, LayoutError> {
    let parse_method: ParseMethod = query.parse_method.parse()?;

    let workspace = ScopedWorkspace::create(state.config.temp_root.as_deref())?;
    let path = workspace.persist_upload(filename, bytes).await?;

    let reader = Arc::clone(&state.backend.reader);
    let document = blocking("document reading", move || reader.read(&path)).await?;

    let options = ParseOptions::from_service(
        &state.config,
        query.lang.clone(),
        parse_method,
        query.page_range(),
    );
    let output_dir = workspace.path().join("output");
    let result = parse_document(&state.backend, &output_dir, filename, document, &options).await;

    if let Err(e) = workspace.close() {
        warn!("Failed to remove workspace: {}", e);
    }
    result
}
