//! HTTP surface for the relay.
//!
//! Routes mirror the research-assistant frontend's expectations:
//!
//! | Route                    | Body                      | Success                     |
//! |--------------------------|---------------------------|-----------------------------|
//! | `GET /health`            |                           | `{status, version}`         |
//! | `POST /api/latex-to-pdf` | `{latex}`                 | `application/pdf`           |
//! | `POST /api/generate-paper` | [`PaperRequest`]        | `{success, paper}`          |
//! | `POST /api/summarize`    | `{text? , arxivId?}`      | `{success, summary}`        |
//! | `POST /api/review`       | `{text? , arxivId?}`      | `{success, review}`         |
//! | `POST /api/analyze`      | `{inputText, type}`       | `{success, analysis}`       |
//! | `POST /api/chatbot`      | `{message}`               | `{success, reply}`          |
//!
//! Every failure is `{success: false, error, log?, trace?}` with 400 for
//! caller mistakes and 500 for everything else.

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::compile::compile_latex_with;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::pipeline::assets::{AssetDir, AssetResolver};
use crate::pipeline::llm::TextGenerator;
use crate::pipeline::runner::{ProcessRunner, SystemRunner};
use crate::research::{self, PaperRequest, PaperSource};

/// Default request body limit: 10 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Application state shared across handlers. Read-only after startup.
pub struct AppState {
    pub config: RelayConfig,
    pub generator: Arc<dyn TextGenerator>,
    pub assets: Arc<dyn AssetResolver>,
    pub runner: Arc<dyn ProcessRunner>,
}

impl AppState {
    /// State backed by the configured asset directory and real subprocesses.
    pub fn new(config: RelayConfig, generator: Arc<dyn TextGenerator>) -> Self {
        let assets = Arc::new(AssetDir::new(&config.assets_dir));
        Self {
            config,
            generator,
            assets,
            runner: Arc::new(SystemRunner),
        }
    }

    pub fn with_assets(mut self, assets: Arc<dyn AssetResolver>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/latex-to-pdf", post(latex_to_pdf_handler))
        .route("/api/generate-paper", post(generate_paper_handler))
        .route("/api/summarize", post(summarize_handler))
        .route("/api/review", post(review_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/chatbot", post(chatbot_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl+C.
pub async fn serve(state: AppState, config: ServerConfig) -> std::io::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid address: {}:{}", config.host, config.port),
            )
        })?;

    let app = create_router(Arc::new(state), config.max_body_bytes);

    tracing::info!("Starting texrelay server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received shutdown signal");
            }
        })
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// A [`RelayError`] on its way to becoming a JSON error response.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RelayError::InvalidRequest(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

/// `Debug` rendering followed by every `source()` in the chain.
fn error_trace(err: &(dyn StdError + 'static)) -> String {
    let mut trace = format!("{:?}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        trace.push_str("\ncaused by: ");
        trace.push_str(&cause.to_string());
        source = cause.source();
    }
    trace
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = self.0;
        if status.is_server_error() {
            tracing::error!("Request failed: {}", err);
        } else {
            tracing::warn!("Rejected request: {}", err);
        }

        let trace = match &err {
            RelayError::Generation(_) => Some(error_trace(&err)),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            error: err.to_string(),
            log: err.log().map(str::to_string),
            trace,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
struct CompileBody {
    #[serde(default)]
    latex: Option<String>,
}

async fn latex_to_pdf_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CompileBody>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = payload?;
    let latex = body.latex.unwrap_or_default();
    let compiled = compile_latex_with(
        &latex,
        &state.config,
        state.assets.as_ref(),
        state.runner.as_ref(),
    )
    .await?;

    tracing::info!(
        "Compiled PDF: {} bytes in {} pass(es), {}ms",
        compiled.stats.pdf_bytes,
        compiled.stats.passes.len(),
        compiled.stats.total_duration_ms
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "inline; filename=\"preview.pdf\""),
        ],
        compiled.pdf,
    )
        .into_response())
}

async fn generate_paper_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PaperRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(request) = payload?;
    let paper = research::generate_paper(
        state.generator.as_ref(),
        &request,
        &state.config.document_class,
    )
    .await?;
    Ok(Json(json!({ "success": true, "paper": paper })))
}

async fn summarize_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PaperSource>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(source) = payload?;
    let summary = research::summarize(state.generator.as_ref(), &source).await?;
    Ok(Json(json!({ "success": true, "summary": summary })))
}

async fn review_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PaperSource>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(source) = payload?;
    let review = research::review(state.generator.as_ref(), &source).await?;
    Ok(Json(json!({ "success": true, "review": review })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBody {
    #[serde(default)]
    input_text: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeBody>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(body) = payload?;
    let analysis = research::analyze(
        state.generator.as_ref(),
        body.input_text.as_deref(),
        body.kind.as_deref(),
    )
    .await?;
    Ok(Json(json!({ "success": true, "analysis": analysis })))
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: Option<String>,
}

async fn chatbot_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(body) = payload?;
    let reply = research::chat(
        state.generator.as_ref(),
        body.message.as_deref().unwrap_or_default(),
    )
    .await?;
    Ok(Json(json!({ "success": true, "reply": reply })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;

    #[test]
    fn default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError(RelayError::missing("latex")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(RelayError::InvalidAnalysisType("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(RelayError::PdfNotFound { log: None }).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError(GenerationError::EmptyResponse.into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn trace_starts_with_debug_rendering() {
        let err: RelayError = GenerationError::Timeout { secs: 5 }.into();
        let trace = error_trace(&err);
        assert!(trace.starts_with("Generation(Timeout"));
    }
}
