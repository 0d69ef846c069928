//! HTTP surface: `POST /execute-command` and `GET /health`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::error::RelayError;
use crate::metrics::MetricsSnapshot;
use crate::relay::{CommandRelay, RelayResult};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<CommandRelay>,
}

impl AppState {
    pub fn new(relay: CommandRelay) -> Self {
        Self {
            relay: Arc::new(relay),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCommandRequest {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
    pub metrics: MetricsSnapshot,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/execute-command", post(execute_command))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn execute_command(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteCommandRequest>, JsonRejection>,
) -> Result<Json<RelayResult>, RelayError> {
    let relay = &state.relay;
    relay.metrics().record_request();

    let outcome = async {
        let Json(req) =
            payload.map_err(|e| RelayError::InvalidInput(format!("invalid request body: {}", e)))?;
        let command = req
            .command
            .ok_or_else(|| RelayError::InvalidInput("Command is required".to_string()))?;
        let session_id = req
            .session_id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| RelayError::InvalidInput("sessionId is required".to_string()))?;

        let span = info_span!("command", session_id = %session_id, request_id = %Uuid::new_v4());
        async {
            info!(command = %command, "received command");
            let result = relay.handle(&session_id, &command).await?;
            info!(kind = ?result.kind, "command handled");
            Ok::<_, RelayError>(result)
        }
        .instrument(span)
        .await
    }
    .await;

    match outcome {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            relay.metrics().record_failure();
            Err(e)
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.relay.store().len(),
        metrics: state.relay.metrics().snapshot(),
    })
}
