use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::{
    downloader::DownloadState,
    error::{AppError, Result},
    models::{ProgrammeItem, WsEvent},
    state::AppState,
};

/// GET /api/downloads: media files already in the downloads folder
pub async fn list_downloads(State(state): State<AppState>) -> Result<Json<Vec<ProgrammeItem>>> {
    let library = state.library.clone();
    let items = tokio::task::spawn_blocking(move || library.scan_existing())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(items))
}

/// GET /api/download
pub async fn download_state(State(state): State<AppState>) -> Json<DownloadState> {
    Json(state.downloader.state())
}

/// Either a bare programme URL or a discovered item. An item comes back on
/// /ws marked as downloaded once the file is in place.
#[derive(Deserialize)]
pub struct StartDownload {
    #[serde(default)]
    pub url: String,
    pub item: Option<ProgrammeItem>,
}

/// POST /api/download
/// 202 once admitted; progress is broadcast on /ws.
pub async fn start_download(
    State(state): State<AppState>,
    Json(body): Json<StartDownload>,
) -> Result<(StatusCode, Json<DownloadState>)> {
    let (url, mut events) = match body.item {
        Some(item) if !item.canonical_url.trim().is_empty() => {
            let url = item.canonical_url.clone();
            (url, state.downloader.start_item(item)?)
        }
        Some(_) => return Err(AppError::BadRequest("item has no programme URL".into())),
        None => {
            let url = body.url.trim().to_string();
            if url.is_empty() {
                return Err(AppError::BadRequest("url is required".into()));
            }
            let events = state.downloader.start(&url)?;
            (url, events)
        }
    };

    let tx = state.events.clone();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let _ = tx.send(WsEvent::Download {
                url: url.clone(),
                event,
            });
        }
    });

    Ok((StatusCode::ACCEPTED, Json(state.downloader.state())))
}

/// POST /api/download/cancel
pub async fn cancel_download(State(state): State<AppState>) -> Result<StatusCode> {
    state.downloader.cancel()?;
    Ok(StatusCode::NO_CONTENT)
}
