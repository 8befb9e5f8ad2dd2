use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use shared_types::{DebugExecuteRequest, DebugExecuteResponse, HealthStatus, PauseAck};
use tracing::{error, info, warn};

use super::rejection;
use crate::collaborators::ExecutionRequest;
use crate::tools::{self, ToolRegistryError};
use crate::AppState;

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        ok: true,
        paused: state.pause.is_paused(),
        run_dir: state.session.root().display().to_string(),
        ts: Utc::now(),
    })
}

/// POST /pause
pub async fn pause(State(state): State<Arc<AppState>>) -> Json<PauseAck> {
    if !state.pause.set(true) {
        info!("engine paused by operator");
    }
    Json(PauseAck { paused: true })
}

/// POST /unpause
pub async fn unpause(State(state): State<Arc<AppState>>) -> Json<PauseAck> {
    if state.pause.set(false) {
        info!("engine resumed by operator");
    }
    Json(PauseAck { paused: false })
}

/// GET /allowed_tools
pub async fn get_allowed_tools(State(state): State<Arc<AppState>>) -> Json<Vec<&'static str>> {
    Json(tools::names(&state.tools.get()))
}

/// POST /allowed_tools: body is a JSON array of tool names
pub async fn set_allowed_tools(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let candidates: Vec<String> = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(name) => Some(name),
                _ => None,
            })
            .collect(),
        _ => return rejection(StatusCode::BAD_REQUEST, "expected json array"),
    };

    match state.tools.set(candidates.as_slice()) {
        Ok(allowed) => Json(tools::names(&allowed)).into_response(),
        Err(e) => {
            if !matches!(e, ToolRegistryError::NoSession) {
                error!(error = %e, "failed to update allowed tools");
            }
            rejection(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /debug/execute: run action text through the executor as a dry run
pub async fn debug_execute(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: DebugExecuteRequest = serde_json::from_slice(&body).unwrap_or_default();

    let timeout = state.executor_timeout;
    let execution = tokio::time::timeout(
        timeout,
        state.executor.execute(ExecutionRequest {
            context: request.raw,
            run_dir: Some(state.session.root().to_path_buf()),
            debug: true,
            allowed_tools: state.tools.get(),
        }),
    )
    .await;

    let failure = match execution {
        Ok(Ok(outcome)) => {
            return Json(DebugExecuteResponse {
                executed: outcome.executed,
                malformed: outcome.malformed,
                error: outcome.error,
            })
            .into_response()
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("execution timed out after {timeout:?}"),
    };

    warn!(error = %failure, "debug execution failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(DebugExecuteResponse {
            error: Some(failure),
            ..DebugExecuteResponse::default()
        }),
    )
        .into_response()
}
