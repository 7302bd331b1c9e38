pub mod discover;
pub mod downloads;
pub mod shows;
pub mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    error::{AppError, Result},
    library::DownloadLibrary,
    models::ProgrammeItem,
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        // Discovery
        .route("/sources", get(discover::list_sources))
        .route("/discover", get(discover::discover))
        // Listings and previews
        .route("/genre", get(shows::genre_shows))
        .route("/episodes", get(shows::show_episodes))
        .route("/detail", get(shows::programme_detail))
        // Downloads
        .route("/downloads", get(downloads::list_downloads))
        .route(
            "/download",
            get(downloads::download_state).post(downloads::start_download),
        )
        .route("/download/cancel", post(downloads::cancel_download));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

/// Mark items already on disk. The file checks run on the blocking pool.
pub(crate) async fn annotated(library: &DownloadLibrary, mut items: Vec<ProgrammeItem>) -> Result<Vec<ProgrammeItem>> {
    let library = library.clone();
    tokio::task::spawn_blocking(move || {
        library.annotate_all(&mut items);
        items
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use chrono::Local;
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        config::{AppConfig, ScheduleSource},
        http::fake::FakeFetcher,
        listing::schedule,
        models::{ProgrammeDetail, ProgrammeItem},
        routes::discover::DiscoverResponse,
    };

    const SCHEDULE: &str = "https://www.bbc.co.uk/schedules/p00fzl86";

    fn server(dir: &tempfile::TempDir, fetcher: FakeFetcher) -> TestServer {
        let config: AppConfig = serde_json::from_value(json!({ "base_dir": dir.path() })).unwrap();
        std::fs::create_dir_all(config.downloads_dir()).unwrap();
        let sources = vec![ScheduleSource {
            name: "BBC Radio 1".into(),
            url: SCHEDULE.into(),
            description: String::new(),
        }];
        let state = AppState::new(Arc::new(config), Arc::new(fetcher), sources);
        TestServer::new(build_router(state)).unwrap()
    }

    #[tokio::test]
    async fn lists_sources() {
        let dir = tempfile::tempdir().unwrap();
        let response = server(&dir, FakeFetcher::default()).get("/api/sources").await;
        response.assert_status_ok();
        let sources: Vec<ScheduleSource> = response.json();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].url, SCHEDULE);
    }

    #[tokio::test]
    async fn discover_returns_annotated_matches() {
        let dir = tempfile::tempdir().unwrap();
        let this_week = schedule::week_url(SCHEDULE, Local::now().date_naive());
        let fetcher = FakeFetcher::default().with_page(
            &this_week,
            r#"<html><body><div class="week-guide__table__item">
                <a class="br-blocklink__link" href="/programmes/m1">Friday Feeling</a>
              </div></body></html>"#,
        );
        let server = server(&dir, fetcher);
        std::fs::write(dir.path().join("Downloads").join("Friday Feeling.mp3"), b"").unwrap();

        let response = server
            .get("/api/discover")
            .add_query_param("q", "friday")
            .add_query_param("months", 1)
            .await;
        response.assert_status_ok();

        let body: DiscoverResponse = response.json();
        assert!(body.errors.is_empty());
        assert_eq!(body.items.len(), 1);
        assert_eq!(body.items[0].canonical_url, "https://www.bbc.co.uk/programmes/m1");
        assert!(body.items[0].is_downloaded);
    }

    #[tokio::test]
    async fn discover_rejects_out_of_range_months() {
        let dir = tempfile::tempdir().unwrap();
        let response = server(&dir, FakeFetcher::default())
            .get("/api/discover")
            .add_query_param("months", 0)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn episodes_require_a_url() {
        let dir = tempfile::tempdir().unwrap();
        let response = server(&dir, FakeFetcher::default()).get("/api/episodes").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failing_listing_is_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::default()
            .failing("https://www.bbc.co.uk/programmes/genres/music/danceandelectronica/player");
        let response = server(&dir, fetcher).get("/api/genre").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert!(body["error"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn genre_and_episode_listings_are_annotated() {
        let dir = tempfile::tempdir().unwrap();
        let genre_url = "https://www.bbc.co.uk/programmes/genres/music/danceandelectronica/player";
        let fetcher = FakeFetcher::default()
            .with_page(
                genre_url,
                r#"<ol class="highlight-box-wrapper"><li><div class="programme">
                    <h2 class="programme__titles"><a href="/programmes/b006wkfp">Essential Mix</a></h2>
                  </div></li></ol>"#,
            )
            .with_page(
                "https://www.bbc.co.uk/programmes/b006wkfp/episodes/player",
                r#"<div class="programme--episode">
                    <a class="programme__titles" href="/programmes/m1">Late Session</a>
                  </div>"#,
            );
        let server = server(&dir, fetcher);
        let downloads = dir.path().join("Downloads");
        std::fs::write(downloads.join("Essential_Mix.m4a"), b"").unwrap();
        std::fs::write(downloads.join("BBC - Late Session.mp3"), b"").unwrap();

        let shows: Vec<ProgrammeItem> = server.get("/api/genre").await.json();
        assert_eq!(shows.len(), 1);
        assert!(shows[0].is_downloaded);
        assert_eq!(
            shows[0].downloaded_file_path.as_deref(),
            Some(downloads.join("Essential_Mix.m4a").as_path())
        );

        let episodes: Vec<ProgrammeItem> = server
            .get("/api/episodes")
            .add_query_param("url", "https://www.bbc.co.uk/programmes/b006wkfp")
            .await
            .json();
        assert_eq!(episodes.len(), 1);
        assert!(episodes[0].is_downloaded);
    }

    #[tokio::test]
    async fn detail_errors_are_reported_in_the_body() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://www.bbc.co.uk/programmes/gone";
        let response = server(&dir, FakeFetcher::default().failing(url))
            .get("/api/detail")
            .add_query_param("url", url)
            .await;
        response.assert_status_ok();
        let detail: ProgrammeDetail = response.json();
        assert!(detail.has_error);
    }

    #[tokio::test]
    async fn lists_existing_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(&dir, FakeFetcher::default());
        std::fs::write(dir.path().join("Downloads").join("BBC - Late_Show.m4a"), b"").unwrap();

        let items: Vec<ProgrammeItem> = server.get("/api/downloads").await.json();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Late Show");
        assert!(items[0].is_downloaded);
    }

    #[tokio::test]
    async fn download_endpoints_without_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(&dir, FakeFetcher::default());

        let state: Value = server.get("/api/download").await.json();
        assert_eq!(state["state"], "idle");

        server
            .post("/api/download")
            .json(&json!({ "url": "https://www.bbc.co.uk/programmes/m1" }))
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);

        server
            .post("/api/download")
            .json(&json!({ "url": "  " }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .post("/api/download")
            .json(&json!({ "item": ProgrammeItem::default() }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let item = ProgrammeItem::new("Essential Mix", "https://www.bbc.co.uk/programmes/m1");
        server
            .post("/api/download")
            .json(&json!({ "item": item }))
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);

        server
            .post("/api/download/cancel")
            .await
            .assert_status(StatusCode::CONFLICT);
    }
}
