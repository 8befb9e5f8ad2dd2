use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared_types::{AnnotationSubmission, CommandAck};
use tracing::{debug, warn};

use super::rejection;
use crate::handshake::HandshakeError;
use crate::AppState;

/// GET /render_job: the frame awaiting annotation, or `{"waiting": true}`
pub async fn render_job(State(state): State<Arc<AppState>>) -> Response {
    match state.handshake.peek() {
        Some(job) => Json(job).into_response(),
        None => Json(json!({ "waiting": true })).into_response(),
    }
}

/// POST /annotated: body `{seq, image_b64}`
pub async fn submit_annotation(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let submission: AnnotationSubmission = match serde_json::from_slice(&body) {
        Ok(submission) => submission,
        Err(e) => {
            debug!(error = %e, "unreadable annotation body");
            return rejection(StatusCode::BAD_REQUEST, "bad json");
        }
    };

    let seq = submission.seq;
    match state.handshake.submit(seq, submission.image_b64) {
        Ok(()) => Json(CommandAck::ok()).into_response(),
        Err(e) => {
            warn!(seq, error = %e, "annotation rejected");
            let status = match e {
                HandshakeError::NoOutstandingJob | HandshakeError::SequenceMismatch { .. } => {
                    StatusCode::CONFLICT
                }
                HandshakeError::InvalidImage { .. } => StatusCode::BAD_REQUEST,
            };
            rejection(status, e.to_string())
        }
    }
}
