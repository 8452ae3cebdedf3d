use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::{
    auth::AuthenticatedUser, error::AppResult, models::Project, state::AppState,
};

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
}

pub async fn list_projects(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<Project>>> {
    Ok(Json(state.memos.list_projects(user.user_id).await?))
}

pub async fn create_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateProjectRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    let project = state
        .memos
        .create_project(user.user_id, &payload.name, payload.description)
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}
