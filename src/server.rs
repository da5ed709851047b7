//! HTTP server for the paper reader front-end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (version, whether a document is loaded) |
//! | `GET`  | `/document` | Status of the active document slot |
//! | `GET`  | `/pdf` | The active document file (`202` while none is loaded) |
//! | `POST` | `/update-pdf` | Load a new document from `{ "link": ... }` |
//! | `POST` | `/query` | Nearest passage for `{ "text": ... }` |
//! | `POST` | `/ask` | Answer `{ "question": ... }` from the nearest passage |
//! | `POST` | `/process-selection` | Explain a selected term `{ "text": ... }` |
//! | `POST` | `/outline` | Compile `{ "text", "summary" }` into a graph and tree |
//! | `POST` | `/generate-mindmap` | Outline the active document and compile it |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `extraction_failed` (422),
//! `fetch_failed` (502), `completion_failed` (502), `embedding_unavailable` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the front-end is served
//! from a different origin.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use paperlens_core::index::ScoredChunk;
use paperlens_core::outline::{compile_outline_with, MindMapNode, OutlineGraph};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::artifacts::ArtifactStore;
use crate::completion::{create_completer, Completer};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::{LoadError, QueryError};
use crate::extract::FileExtractor;
use crate::fetch::HttpFetcher;
use crate::session::{SessionManager, SlotStatus};

/// Characters of document text given to the completer when outlining.
const MINDMAP_CONTEXT_CHARS: usize = 12_000;

/// Shared application state passed to all route handlers.
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub completer: Arc<dyn Completer>,
    pub config: Arc<Config>,
}

/// Build the session and providers from `config`, start the sweeper, and
/// serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let config = Arc::new(config.clone());

    let store = Arc::new(ArtifactStore::open(&config.artifacts.dir)?);
    let session = Arc::new(SessionManager::new(
        store,
        Arc::new(HttpFetcher::new(Duration::from_secs(60))?),
        Arc::new(FileExtractor::new(config.chunking.max_tokens)),
        create_embedder(&config.embedding)?,
    ));
    let sweeper = session.spawn_sweeper(
        config.artifacts.sweep_interval(),
        config.artifacts.max_age(),
    );

    let state = Arc::new(AppState {
        session,
        completer: create_completer(&config.completion)?,
        config: Arc::clone(&config),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        artifacts = %config.artifacts.dir.display(),
        embedder = state.session.embedder().model_name(),
        completer = state.completer.model_name(),
        "server listening"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down");
        })
        .await?;

    sweeper.abort();
    Ok(())
}

/// Create the router with all routes configured.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/document", get(handle_document))
        .route("/pdf", get(handle_pdf))
        .route("/update-pdf", post(handle_update_pdf))
        .route("/query", post(handle_query))
        .route("/ask", post(handle_ask))
        .route("/process-selection", post(handle_process_selection))
        .route("/outline", post(handle_outline))
        .route("/generate-mindmap", post(handle_generate_mindmap))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn completion_failed(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "completion_failed",
        message: format!("{:#}", err),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<LoadError> for AppError {
    fn from(err: LoadError) -> Self {
        let status = match err {
            LoadError::FetchFailed(_) => StatusCode::BAD_GATEWAY,
            LoadError::ExtractionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LoadError::EmbeddingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        AppError {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound => not_found("no document loaded or no matching passage"),
            QueryError::EmbeddingUnavailable(msg) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "embedding_unavailable",
                message: msg,
            },
        }
    }
}

fn loading_response() -> Response {
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "loading" })),
    )
        .into_response()
}

// ============ GET /health, GET /document ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    pdf_loaded: bool,
    loading: bool,
    path: Option<String>,
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = state.session.status();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        pdf_loaded: status.ready,
        loading: status.loading > 0,
        path: status.path.map(|p| p.display().to_string()),
    })
}

async fn handle_document(State(state): State<Arc<AppState>>) -> Json<SlotStatus> {
    Json(state.session.status())
}

// ============ GET /pdf ============

/// Streams the active file. A document replaced mid-request is still served
/// from the snapshot taken at the start, unless the sweeper already
/// removed it.
async fn handle_pdf(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let Some(slot) = state.session.current_slot() else {
        return Ok(loading_response());
    };

    let bytes = tokio::fs::read(&slot.path).await.map_err(|e| {
        warn!(path = %slot.path.display(), error = %e, "failed to read active document");
        internal("failed to serve document")
    })?;

    let content_type = match slot.path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("md") | Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, "inline"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        bytes,
    )
        .into_response())
}

// ============ POST /update-pdf ============

#[derive(Deserialize)]
struct UpdateRequest {
    #[serde(default)]
    link: String,
}

#[derive(Serialize)]
struct UpdateResponse {
    message: &'static str,
    status: SlotStatus,
}

async fn handle_update_pdf(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<UpdateResponse>, AppError> {
    let link = req.link.trim().to_string();
    if link.is_empty() {
        return Err(bad_request("link must not be empty"));
    }

    // Spawned so the load still completes if the client disconnects.
    let session = Arc::clone(&state.session);
    let task = tokio::spawn(async move { session.load_document(&link).await.map(|_| ()) });
    task.await
        .map_err(|e| internal(format!("load task failed: {}", e)))??;

    Ok(Json(UpdateResponse {
        message: "document loaded",
        status: state.session.status(),
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    text: String,
}

async fn handle_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ScoredChunk>, AppError> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    Ok(Json(state.session.query(text).await?))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    source: ScoredChunk,
}

async fn handle_ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let source = state.session.query(question).await?;
    let answer = state
        .completer
        .complete(&ask_prompt(question, &source))
        .await
        .map_err(completion_failed)?;

    Ok(Json(AskResponse { answer, source }))
}

fn ask_prompt(question: &str, source: &ScoredChunk) -> String {
    format!(
        "Answer the question using only the passage from a research paper below. \
         If the passage does not contain the answer, say so.\n\n\
         Section: {}\nPassage:\n{}\n\nQuestion: {}",
        source.chunk.topic, source.chunk.text, question
    )
}

// ============ POST /process-selection ============

#[derive(Deserialize)]
struct SelectionRequest {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct SelectionResponse {
    analysis: String,
}

async fn handle_process_selection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<SelectionResponse>, AppError> {
    let selection = req.text.trim();
    if selection.is_empty() {
        return Err(bad_request("selection must not be empty"));
    }

    // Context is optional; explain the term on its own if retrieval fails.
    let context = match state.session.query(selection).await {
        Ok(hit) => Some(hit),
        Err(QueryError::NotFound) => None,
        Err(e) => {
            warn!(error = %e, "no context for selection");
            None
        }
    };

    let analysis = state
        .completer
        .complete(&selection_prompt(selection, context.as_ref()))
        .await
        .map_err(completion_failed)?;
    Ok(Json(SelectionResponse { analysis }))
}

fn selection_prompt(selection: &str, context: Option<&ScoredChunk>) -> String {
    match context {
        Some(hit) => format!(
            "Explain the meaning of '{}' as it is used in this passage of a research paper. \
             Keep it short and concrete.\n\nSection: {}\nPassage:\n{}",
            selection, hit.chunk.topic, hit.chunk.text
        ),
        None => format!(
            "Explain the meaning of '{}' in the context of research papers. \
             Keep it short and concrete.",
            selection
        ),
    }
}

// ============ POST /outline, POST /generate-mindmap ============

#[derive(Deserialize)]
struct OutlineRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    summary: String,
}

#[derive(Serialize)]
struct OutlineResponse {
    graph: OutlineGraph,
    #[serde(rename = "mindMap")]
    mind_map: MindMapNode,
}

impl OutlineResponse {
    fn compile(config: &Config, text: &str, summary: &str) -> Self {
        let graph = compile_outline_with(text, summary, config.outline.excerpt_chars);
        let mind_map = graph.to_tree();
        Self { graph, mind_map }
    }
}

/// Never fails: malformed outlines fall back to a summary or star graph.
async fn handle_outline(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OutlineRequest>,
) -> Json<OutlineResponse> {
    Json(OutlineResponse::compile(
        &state.config,
        &req.text,
        &req.summary,
    ))
}

async fn handle_generate_mindmap(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let Some(slot) = state.session.current_slot() else {
        return Ok(loading_response());
    };

    let mut context = String::new();
    for chunk in slot.index.chunks() {
        if context.len() >= MINDMAP_CONTEXT_CHARS {
            break;
        }
        context.push_str(&chunk.embedding_text());
        context.push_str("\n\n");
    }
    let summary = slot
        .index
        .chunks()
        .next()
        .map(|c| c.text.clone())
        .unwrap_or_default();

    let outline = state
        .completer
        .complete(&mindmap_prompt(&context))
        .await
        .map_err(completion_failed)?;

    Ok(Json(OutlineResponse::compile(&state.config, &outline, &summary)).into_response())
}

fn mindmap_prompt(context: &str) -> String {
    format!(
        "Summarize the research paper below as a hierarchical bullet outline. \
         Use '- ' bullets, indent each level by two spaces, keep labels under \
         eight words, and output only the outline.\n\n{}",
        context
    )
}
