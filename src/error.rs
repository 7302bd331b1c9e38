use std::path::PathBuf;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// A page could not be fetched. Always transient from the caller's point of view.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Reasons a download could not be started.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("a download is already in progress")]
    Busy,

    #[error("download tool not found at {}", .0.display())]
    ToolMissing(PathBuf),

    #[error("no download is in progress")]
    NotRunning,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        AppError::Unavailable(e.to_string())
    }
}

impl From<DownloadError> for AppError {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::Busy | DownloadError::NotRunning => AppError::Conflict(e.to_string()),
            DownloadError::ToolMissing(_) => AppError::Unavailable(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            AppError::Unavailable(m) => {
                tracing::warn!("Upstream unavailable: {m}");
                (StatusCode::SERVICE_UNAVAILABLE, m.clone())
            }
            AppError::Internal(m) => {
                tracing::error!("Internal error: {m}");
                (StatusCode::INTERNAL_SERVER_ERROR, m.clone())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
