use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Deserialize)]
pub struct SignedFileQuery {
    pub expires: i64,
    pub sig: String,
}

/// Serves an object from local storage to whoever holds a valid signed URL.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedFileQuery>,
) -> AppResult<Response> {
    let files = state
        .local_files
        .as_ref()
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "file not found"))?;

    if !files.verify(&key, query.expires, &query.sig, Utc::now()) {
        return Err(AppError::new(
            StatusCode::FORBIDDEN,
            "signature invalid or expired",
        ));
    }

    let bytes = files
        .read_object(&key)
        .await
        .map_err(AppError::storage_unavailable)?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "file not found"))?;
    let mime = mime_guess::from_path(&key).first_or_octet_stream();

    Response::builder()
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .map_err(|err| AppError::internal(format!("failed to build response: {err}")))
}
