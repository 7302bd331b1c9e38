use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::normalize::normalize_url;

// ── Programme item ────────────────────────────────────────────────────────────

/// A programme discovered on a BBC listing page, or a media file already
/// sitting in the downloads folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgrammeItem {
    pub display_name: String,
    pub title: String,
    /// Normalised programme URL. Empty only for items found by the local
    /// downloads scan.
    pub canonical_url: String,
    pub description: String,
    pub image_url: Option<String>,
    /// `None` means unknown.
    pub broadcast_date: Option<NaiveDate>,
    pub is_downloaded: bool,
    pub downloaded_file_path: Option<PathBuf>,
}

impl ProgrammeItem {
    /// Build an item for a network-discovered programme. `url` is normalised.
    pub fn new(title: impl Into<String>, url: &str) -> Self {
        let title = title.into();
        Self {
            display_name: title.clone(),
            title,
            canonical_url: normalize_url(url),
            ..Default::default()
        }
    }

    pub fn mark_downloaded(&mut self, path: impl AsRef<Path>) {
        self.is_downloaded = true;
        self.downloaded_file_path = Some(path.as_ref().to_path_buf());
    }

    pub fn clear_download(&mut self) {
        self.is_downloaded = false;
        self.downloaded_file_path = None;
    }
}

/// Drop items whose canonical URL was already seen, keeping the first.
/// Items without a URL (local files) are never considered duplicates.
pub fn dedup_by_url(items: Vec<ProgrammeItem>) -> Vec<ProgrammeItem> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| item.canonical_url.is_empty() || seen.insert(item.canonical_url.clone()))
        .collect()
}

/// Newest first; undated items go last. Stable, so ties keep discovery order.
pub fn sort_newest_first(items: &mut [ProgrammeItem]) {
    items.sort_by(|a, b| b.broadcast_date.cmp(&a.broadcast_date));
}

// ── Programme detail ──────────────────────────────────────────────────────────

/// Rich metadata for a single programme, used for previews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgrammeDetail {
    pub url: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub duration: Option<String>,
    /// Broadcast date as printed on the page.
    pub broadcast_date: Option<String>,
    /// Machine-readable broadcast time, when the page carries one.
    pub broadcast_at: Option<DateTime<FixedOffset>>,
    pub image_url: Option<String>,
    pub genres: Vec<String>,
    /// First JSON-LD block on the page.
    pub structured_data: Option<serde_json::Value>,
    pub has_error: bool,
    pub error_message: Option<String>,
}

impl ProgrammeDetail {
    pub fn failed(url: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            url: url.to_string(),
            title: "Error loading programme".to_string(),
            description: Some(format!("Failed to load programme content: {message}")),
            has_error: true,
            error_message: Some(message),
            ..Default::default()
        }
    }
}

// ── Progress events ───────────────────────────────────────────────────────────

/// Severity of a progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

/// Parsed download progress tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub percent: f64,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub size: Option<String>,
}

/// How a download session ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Completed { path: Option<PathBuf> },
    Failed { exit_code: Option<i32>, message: String },
    Cancelled,
}

/// One entry of a download session's event stream. The stream always ends
/// with exactly one `Finished`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadEvent {
    Line { level: EventLevel, text: String },
    Progress(ProgressUpdate),
    Destination { path: PathBuf },
    /// The programme the session was started for, now marked as downloaded.
    /// Sent just before a successful `Finished`.
    Downloaded { item: ProgrammeItem },
    Finished(DownloadOutcome),
}

/// Result of one discovery run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub items: Vec<ProgrammeItem>,
    /// One message per page that could not be fetched.
    pub errors: Vec<String>,
}

/// One entry of a discovery run's event stream. The stream always ends with
/// exactly one `Finished`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    Started { total: usize },
    PageDone { processed: usize, total: usize },
    PageFailed { url: String, message: String },
    Finished(DiscoveryReport),
}

impl DiscoveryEvent {
    pub fn message(&self) -> String {
        match self {
            DiscoveryEvent::Started { total } => format!("Processing {total} weeks in parallel..."),
            DiscoveryEvent::PageDone { processed, total } => {
                format!("Processed {processed} of {total} weeks...")
            }
            DiscoveryEvent::PageFailed { url, message } => {
                format!("Error processing {url}: {message}")
            }
            DiscoveryEvent::Finished(report) => format!(
                "Scraping complete. Found {} matching shows.",
                report.items.len()
            ),
        }
    }
}

/// Live event broadcast via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Discovery {
        session: uuid::Uuid,
        message: String,
        event: DiscoveryEvent,
    },
    Download {
        url: String,
        event: DownloadEvent,
    },
}
