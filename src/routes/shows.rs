use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    listing::{episodes, genre},
    models::{ProgrammeDetail, ProgrammeItem},
    state::AppState,
};

#[derive(Deserialize)]
pub struct UrlQuery {
    #[serde(default)]
    pub url: String,
}

impl UrlQuery {
    fn require(&self) -> Result<&str> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(AppError::BadRequest("url is required".into()));
        }
        Ok(url)
    }
}

/// GET /api/genre
pub async fn genre_shows(State(state): State<AppState>) -> Result<Json<Vec<ProgrammeItem>>> {
    let shows = genre::fetch_shows(state.fetcher.as_ref(), &state.config.genre_url).await?;
    Ok(Json(super::annotated(&state.library, shows).await?))
}

/// GET /api/episodes?url=...
pub async fn show_episodes(
    State(state): State<AppState>,
    Query(params): Query<UrlQuery>,
) -> Result<Json<Vec<ProgrammeItem>>> {
    let items = episodes::fetch_episodes(state.fetcher.as_ref(), params.require()?).await?;
    Ok(Json(super::annotated(&state.library, items).await?))
}

/// GET /api/detail?url=...
/// Always 200 once the URL is present; fetch problems are reported in the body.
pub async fn programme_detail(
    State(state): State<AppState>,
    Query(params): Query<UrlQuery>,
) -> Result<Json<ProgrammeDetail>> {
    Ok(Json(state.detail.fetch_detail(params.require()?).await))
}
