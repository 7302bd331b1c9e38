mod config;
mod detail;
mod discovery;
mod downloader;
mod error;
mod extract;
mod http;
mod library;
mod listing;
mod models;
mod normalize;
mod routes;
mod state;

use std::sync::Arc;

use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{http::HttpFetcher, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "soundz=info,tower_http=info".into()))
        .with(fmt::layer())
        .init();

    // ── Config ───────────────────────────────────────────────────────────────
    let config = Arc::new(config::AppConfig::from_env()?);
    info!("Starting soundz, binding to {}", config.bind);

    let downloads = config.downloads_dir();
    tokio::fs::create_dir_all(&downloads).await?;

    let sources = config::load_sources(&config.sources_file());

    // ── Application state ─────────────────────────────────────────────────────
    let fetcher = Arc::new(HttpFetcher::new(&config)?);
    let state = AppState::new(Arc::clone(&config), fetcher, sources);

    if state.downloader.is_available() {
        info!("yt-dlp found at {}", state.downloader.tool().display());
    } else {
        warn!(
            "yt-dlp not found at {}; downloads are disabled",
            state.downloader.tool().display()
        );
    }

    let mut download_state = state.downloader.subscribe();
    tokio::spawn(async move {
        while download_state.changed().await.is_ok() {
            let current = download_state.borrow_and_update().clone();
            debug!("Download state: {current:?}");
        }
    });

    let existing = state.library.scan_existing();
    info!(
        "Found {} existing download(s) in {}",
        existing.len(),
        downloads.display()
    );

    // ── HTTP server ───────────────────────────────────────────────────────────
    let router = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Listening on http://{}", config.bind);

    axum::serve(listener, router).await?;

    Ok(())
}
