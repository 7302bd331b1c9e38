use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::{
    config::ScheduleSource,
    error::{AppError, Result},
    models::{DiscoveryEvent, DiscoveryReport, ProgrammeItem, WsEvent},
    state::AppState,
};

/// Furthest back a single discovery may look.
const MAX_MONTHS: u32 = 24;

/// GET /api/sources
pub async fn list_sources(State(state): State<AppState>) -> Json<Vec<ScheduleSource>> {
    Json(state.discovery.sources().to_vec())
}

#[derive(Deserialize)]
pub struct DiscoverQuery {
    #[serde(default)]
    pub q: String,
    pub months: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub session: Uuid,
    pub items: Vec<ProgrammeItem>,
    pub errors: Vec<String>,
}

/// GET /api/discover?q=...&months=N
/// Progress for the run is broadcast on /ws under the returned session id.
pub async fn discover(
    State(state): State<AppState>,
    Query(params): Query<DiscoverQuery>,
) -> Result<Json<DiscoverResponse>> {
    let months = params.months.unwrap_or(state.config.discovery_months);
    if !(1..=MAX_MONTHS).contains(&months) {
        return Err(AppError::BadRequest(format!("months must be between 1 and {MAX_MONTHS}")));
    }

    let session = Uuid::new_v4();
    let mut events = state.discovery.discover(&params.q, months);
    let mut report = DiscoveryReport::default();

    while let Some(event) = events.next().await {
        let _ = state.events.send(WsEvent::Discovery {
            session,
            message: event.message(),
            event: event.clone(),
        });
        if let DiscoveryEvent::Finished(finished) = event {
            report = finished;
        }
    }

    let items = super::annotated(&state.library, report.items).await?;

    Ok(Json(DiscoverResponse {
        session,
        items,
        errors: report.errors,
    }))
}
