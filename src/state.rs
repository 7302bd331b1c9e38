use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{
    config::{AppConfig, ScheduleSource},
    detail::DetailFetcher,
    discovery::ScheduleDiscovery,
    downloader::Downloader,
    http::PageFetcher,
    library::DownloadLibrary,
    models::WsEvent,
};

/// Shared application state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub discovery: ScheduleDiscovery,
    pub detail: Arc<DetailFetcher>,
    pub library: DownloadLibrary,
    pub downloader: Downloader,
    /// Broadcast channel for real-time WebSocket events.
    pub events: broadcast::Sender<WsEvent>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, fetcher: Arc<dyn PageFetcher>, sources: Vec<ScheduleSource>) -> Self {
        let downloads = config.downloads_dir();
        let (events, _) = broadcast::channel::<WsEvent>(256);

        Self {
            discovery: ScheduleDiscovery::with_workers(
                Arc::clone(&fetcher),
                Arc::new(sources),
                config.discovery_workers,
            ),
            detail: Arc::new(DetailFetcher::new(Arc::clone(&fetcher))),
            library: DownloadLibrary::new(&downloads),
            downloader: Downloader::new(config.ytdlp_path(), downloads, config.user_agent.clone()),
            fetcher,
            events,
            config,
        }
    }
}
