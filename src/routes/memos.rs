use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::{
    attachments::{parse_seed_attachments, GeoPoint, MediaUpload},
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    memos::{CaptureInput, MemoFilter, MemoPatch, MemoStatus, MemoView, ProjectFilter},
    state::AppState,
    utils::json::{classify_nullable, Nullable},
};

#[derive(Serialize)]
pub struct CaptureResponse {
    pub id: Uuid,
    pub status: MemoStatus,
    pub audio_url: String,
    /// How long until the transcript is expected: `"2s"` in mock mode,
    /// otherwise `"pending"`.
    pub estimated_wait: &'static str,
    pub memo: MemoView,
}

#[derive(Deserialize, Default)]
pub struct ListMemosQuery {
    pub status: Option<String>,
    pub project_id: Option<String>,
}

pub async fn capture_memo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<CaptureResponse>)> {
    let mut audio: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut seeds_raw: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                file_name = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                audio = Some(data.to_vec());
            }
            Some("attachments") => {
                seeds_raw = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let audio = audio.ok_or_else(|| AppError::bad_request("file field is required"))?;
    let seeds = parse_seed_attachments(seeds_raw.as_deref()).map_err(AppError::bad_request)?;

    let memo = state
        .memos
        .capture(
            user.user_id,
            CaptureInput {
                audio,
                file_name,
                content_type,
                seeds,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CaptureResponse {
            id: memo.id,
            status: memo.status,
            audio_url: memo.audio_url.clone(),
            estimated_wait: if state.config.use_mock { "2s" } else { "pending" },
            memo,
        }),
    ))
}

pub async fn list_memos(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListMemosQuery>,
) -> AppResult<Json<Vec<MemoView>>> {
    let filter = parse_list_filter(&query).map_err(AppError::bad_request)?;
    let memos = state.memos.list(user.user_id, &filter).await?;
    Ok(Json(memos))
}

pub async fn get_memo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(memo_id): Path<Uuid>,
) -> AppResult<Json<MemoView>> {
    Ok(Json(state.memos.get(user.user_id, memo_id).await?))
}

pub async fn update_memo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(memo_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<MemoView>> {
    let patch = parse_memo_patch(&body).map_err(AppError::bad_request)?;
    Ok(Json(state.memos.update(user.user_id, memo_id, patch).await?))
}

pub async fn delete_memo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(memo_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.memos.delete(user.user_id, memo_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_attachments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(memo_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<MemoView>> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if !matches!(field.name(), Some("files") | Some("file")) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        files.push(MediaUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Ok(Json(
        state.memos.add_media(user.user_id, memo_id, files).await?,
    ))
}

pub async fn add_location(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(memo_id): Path<Uuid>,
    Json(point): Json<GeoPoint>,
) -> AppResult<Json<MemoView>> {
    Ok(Json(
        state.memos.add_location(user.user_id, memo_id, point).await?,
    ))
}

/// Keeps the rejection's own status so an oversized body answers 413.
fn multipart_error(err: MultipartError) -> AppError {
    let status = err.status();
    warn!(error = %err, %status, "rejected multipart body");
    AppError::new(status, err.body_text())
}

fn parse_list_filter(query: &ListMemosQuery) -> Result<MemoFilter, String> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::parse::<MemoStatus>)
        .transpose()?;

    let project = match query.project_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) if value.eq_ignore_ascii_case("inbox") || value == "null" => {
            Some(ProjectFilter::Inbox)
        }
        Some(value) => Some(ProjectFilter::Project(
            Uuid::parse_str(value).map_err(|_| "project_id must be a UUID or 'inbox'".to_string())?,
        )),
    };

    Ok(MemoFilter { status, project })
}

fn parse_memo_patch(body: &Value) -> Result<MemoPatch, String> {
    let Value::Object(fields) = body else {
        return Err("request body must be a JSON object".to_string());
    };

    let content = classify_nullable::<String>("content", fields.get("content"))?;
    let project_id = classify_nullable::<Uuid>("project_id", fields.get("project_id"))?;
    let new_project_name =
        match classify_nullable::<String>("new_project_name", fields.get("new_project_name"))? {
            Nullable::Value(name) => Some(name),
            Nullable::Null | Nullable::Omitted => None,
        };
    let status = match classify_nullable::<String>("status", fields.get("status"))? {
        Nullable::Omitted => None,
        Nullable::Null => return Err("status cannot be null".to_string()),
        Nullable::Value(raw) => Some(raw.parse::<MemoStatus>()?),
    };

    Ok(MemoPatch {
        content,
        project_id,
        new_project_name,
        status,
    })
}
