use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("you must be logged in")]
    Unauthorized,
    #[error("file not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("a user with this email already exists")]
    DuplicateUser,
    #[error("no file uploaded")]
    NoFileProvided,
    #[error("{0}")]
    InvalidInput(String),
    #[error("{}", .0.body_text())]
    Upload(#[from] MultipartError),
    #[error("filesystem operation failed")]
    Filesystem(#[source] std::io::Error),
    #[error("storage failure")]
    Storage(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DuplicateUser => StatusCode::CONFLICT,
            AppError::NoFileProvided | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Upload(e) => e.status(),
            AppError::Filesystem(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Filesystem(e) => tracing::error!(error = %e, "filesystem error"),
            AppError::Storage(e) => tracing::error!(error = ?e, "storage error"),
            _ => {}
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
