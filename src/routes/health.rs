use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    transcription: &'static str,
}

/// Liveness check. Reports whether captured audio will be transcribed.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let transcription = if state.memos.transcription_enabled() {
        "enabled"
    } else {
        "disabled"
    };
    Json(HealthResponse {
        status: "ok",
        transcription,
    })
}
