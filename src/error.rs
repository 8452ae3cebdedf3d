use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

use crate::memos::MemoError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    /// Object storage failure. The cause is logged, never returned, since it
    /// names object keys.
    pub fn storage_unavailable<E: Display>(error: E) -> Self {
        tracing::error!(error = %error, "object storage failure");
        Self::new(StatusCode::BAD_GATEWAY, "object storage unavailable")
    }

    /// Logs the cause and answers with a fixed message.
    pub fn internal<E: Display>(error: E) -> Self {
        tracing::error!(error = %error, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<MemoError> for AppError {
    fn from(value: MemoError) -> Self {
        match value {
            MemoError::NotFound => AppError::new(StatusCode::NOT_FOUND, "memo not found"),
            MemoError::Validation(message) => AppError::bad_request(message),
            MemoError::Storage(err) => AppError::storage_unavailable(format!("{err:#}")),
            MemoError::Store(err) => AppError::internal(format!("{err:#}")),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(format!("{value:#}"))
    }
}
