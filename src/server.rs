//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Run the `ask` pipeline |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Malformed requests get a JSON error body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `timeout` (408).
//!
//! A well-formed request always gets `200` with the pipeline's result,
//! which may itself be `{"success": false, ...}`.
//!
//! Requests that exceed `[server].request_timeout_secs` get `408`. A
//! timeout before the final answer cancels any in-flight provider call and
//! nothing is persisted. Once the answer exists, its log entry and history
//! turn are written to completion even if the request is dropped.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::ask::{AskResult, Pipeline};
use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub request_timeout: Duration,
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config, config_dir: &Path) -> anyhow::Result<()> {
    migrate::run_migrations(config).await?;
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let pipeline = Pipeline::from_config(config, config_dir, store)?;

    let state = AppState {
        pipeline: Arc::new(pipeline),
        request_timeout: Duration::from_secs(config.server.request_timeout_secs),
    };

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, "askbase server listening");
    println!("askbase server listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
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

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
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

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ask ============

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub session_id: String,
    pub organization_id: i64,
}

/// Handler for `POST /ask`.
///
/// Returns `400` for an empty question or session id and `408` when the
/// pipeline outlives the request timeout.
pub async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResult>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    if req.session_id.trim().is_empty() {
        return Err(bad_request("session_id must not be empty"));
    }

    let result = tokio::time::timeout(
        state.request_timeout,
        state
            .pipeline
            .ask(&req.question, &req.session_id, req.organization_id),
    )
    .await
    .map_err(|_| {
        tracing::warn!(
            session = %req.session_id,
            organization = req.organization_id,
            "ask timed out"
        );
        timeout_error(format!(
            "ask timed out after {}s",
            state.request_timeout.as_secs()
        ))
    })?;

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ask::PipelineOptions;
    use askbase_core::notify::NoopNotifier;
    use askbase_core::store::memory::InMemoryStore;

    fn state() -> AppState {
        let pipeline = Pipeline::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(crate::embedding::DisabledEmbedder),
            Arc::new(crate::llm::DisabledModel),
            Arc::new(NoopNotifier),
            PipelineOptions::default(),
        );
        AppState {
            pipeline: Arc::new(pipeline),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_empty_question_is_bad_request() {
        let err = handle_ask(
            State(state()),
            Json(AskRequest {
                question: "  ".to_string(),
                session_id: "s1".to_string(),
                organization_id: 1,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "bad_request");
    }

    #[tokio::test]
    async fn test_model_failure_is_still_200() {
        let Json(result) = handle_ask(
            State(state()),
            Json(AskRequest {
                question: "What is your refund policy?".to_string(),
                session_id: "s1".to_string(),
                organization_id: 1,
            }),
        )
        .await
        .unwrap();
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_health() {
        let Json(health) = handle_health().await;
        assert_eq!(health.status, "ok");
    }
}
