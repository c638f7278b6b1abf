//! HTTP front end for the consultant.
//!
//! A thin JSON layer over [`RagService`]. Each request is answered on its
//! own; the optional `session_id` only groups turns for later display via
//! `GET /sessions/{id}`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a question with citations |
//! | `GET`  | `/sessions/{id}` | Turn history of a session |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `retrieval_unavailable` (503), `generation_failed` (502),
//! `configuration` (500), `internal` (500).

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rag_consultant_core::RagError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::service::{self, RagService};
use crate::session::{ChatSession, SessionStore};

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    service: Arc<RagService>,
    sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(service: Arc<RagService>) -> Self {
        Self {
            service,
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

/// Routes with permissive CORS, ready to serve.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/sessions/{id}", get(handle_session))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// `consult serve`: load the service and listen on `[server].bind`.
///
/// Startup fails before binding when credentials or the index are
/// missing, so a running server can always reach its index.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = service::shared(config).await?;
    let app = router(AppState::new(service));

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("consult server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
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

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::Retrieval(_) | RagError::Embedding { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Generation { .. } => StatusCode::BAD_GATEWAY,
            RagError::Configuration(_) | RagError::Ingestion(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        // Detail goes to the log; the client gets the user-facing text.
        warn!(code = err.code(), error = %err, "query failed");
        let code = match &err {
            RagError::Embedding { .. } => "retrieval_unavailable",
            RagError::Ingestion(_) => "internal",
            other => other.code(),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.user_message().to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    session_id: Option<String>,
    /// Overrides `[retrieval].top_k` for this request.
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<String>,
    /// Answer followed by the rendered sources block.
    response: String,
    session_id: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(req) = body.map_err(|rejection| bad_request(rejection.body_text()))?;
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    if req.k == Some(0) {
        return Err(bad_request("k must be at least 1"));
    }

    let answer = match req.k {
        Some(k) => state.service.answer_top_k(question, k).await?,
        None => state.service.answer(question).await?,
    };
    let response = answer.render();
    let session_id = state
        .sessions
        .record(req.session_id, question, &response)
        .await;

    Ok(Json(AskResponse {
        answer: answer.text,
        sources: answer.sources,
        response,
        session_id,
    }))
}

// ============ GET /sessions/{id} ============

async fn handle_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChatSession>, AppError> {
    state
        .sessions
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))
}
