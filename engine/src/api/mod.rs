//! Operator-facing HTTP boundary.
//!
//! | route | handler |
//! |---|---|
//! | `GET /`, `/index.html`, `/canvas` | operator panel page |
//! | `GET /health` | [`control::health`] |
//! | `GET /events` | [`events::stream_events`] |
//! | `POST /pause`, `/unpause` | [`control::pause`], [`control::unpause`] |
//! | `GET /render_job`, `POST /annotated` | [`annotation`] |
//! | `GET/POST /allowed_tools` | [`control::get_allowed_tools`], [`control::set_allowed_tools`] |
//! | `POST /debug/execute` | [`control::debug_execute`] |

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use shared_types::CommandAck;
use tower_http::{services::ServeFile, trace::TraceLayer};

use crate::AppState;

pub mod annotation;
pub mod control;
pub mod events;

pub fn router(state: Arc<AppState>) -> Router {
    let panel = ServeFile::new(&state.panel_html);

    Router::new()
        .route_service("/", panel.clone())
        .route_service("/index.html", panel.clone())
        .route_service("/canvas", panel)
        .route("/health", get(control::health))
        .route("/events", get(events::stream_events))
        .route("/pause", post(control::pause))
        .route("/unpause", post(control::unpause))
        .route("/render_job", get(annotation::render_job))
        .route("/annotated", post(annotation::submit_annotation))
        .route(
            "/allowed_tools",
            get(control::get_allowed_tools).post(control::set_allowed_tools),
        )
        .route("/debug/execute", post(control::debug_execute))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `{ok: false, error}` with the given status.
pub(crate) fn rejection(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(CommandAck::error(message))).into_response()
}
