use crate::AppState;
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const STATUS_TEXT: &str = "Drawing Collaboration Server is Active";

/// Plain-text liveness answer for a GET on the base path.
pub async fn status_page() -> &'static str {
    STATUS_TEXT
}

// The response structure for the health handler.
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    sessions: usize,
    started_at: DateTime<Utc>,
}

/// Handler reporting liveness plus the number of connected sessions.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.relay.session_count().await,
        started_at: state.started_at,
    })
}
