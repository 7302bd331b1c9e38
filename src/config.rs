use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Browser user agent sent on every page fetch and passed to yt-dlp.
/// The BBC serves a cookie wall to obvious bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

/// Application configuration, loaded from environment variables / .env.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Bind address for the HTTP server.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Application base directory. The download tool, the sources file and the
    /// `Downloads` folder are resolved relative to it.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Where downloads are written. Defaults to `{base_dir}/Downloads`.
    #[serde(default)]
    pub downloads_dir: Option<PathBuf>,

    /// JSON file listing the schedule sources. Defaults to `{base_dir}/sources.json`.
    #[serde(default)]
    pub sources_file: Option<PathBuf>,

    /// Path to the yt-dlp binary. Defaults to `yt-dlp` inside `base_dir`.
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Curated genre page used by the genre listing.
    #[serde(default = "default_genre_url")]
    pub genre_url: String,

    /// How far back schedule discovery looks, in calendar months.
    #[serde(default = "default_discovery_months")]
    pub discovery_months: u32,

    /// Maximum number of schedule pages fetched at the same time.
    #[serde(default = "default_discovery_workers")]
    pub discovery_workers: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Optional HTTP proxy for page fetches.
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}
fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_genre_url() -> String {
    "https://www.bbc.co.uk/programmes/genres/music/danceandelectronica/player".to_string()
}
fn default_discovery_months() -> u32 {
    2
}
fn default_discovery_workers() -> usize {
    crate::discovery::DEFAULT_WORKERS
}
fn default_request_timeout_secs() -> u64 {
    20
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env if present; it is optional
        let _ = dotenvy::dotenv();

        envy::from_env::<AppConfig>().context("Failed to load config from environment")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.downloads_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("Downloads"))
    }

    pub fn sources_file(&self) -> PathBuf {
        self.sources_file
            .clone()
            .unwrap_or_else(|| self.base_dir.join("sources.json"))
    }

    pub fn ytdlp_path(&self) -> PathBuf {
        let bin = if cfg!(windows) { "yt-dlp.exe" } else { "yt-dlp" };
        self.ytdlp_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join(bin))
    }
}

// ── Schedule sources ──────────────────────────────────────────────────────────

/// One BBC schedule to scan, e.g. a radio network's weekly schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSource {
    pub name: String,
    /// Base schedule URL; week pages are `{url}/{year}/w{week}`.
    pub url: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    sources: Vec<ScheduleSource>,
}

pub fn default_sources() -> Vec<ScheduleSource> {
    vec![ScheduleSource {
        name: "BBC Radio 1".to_string(),
        url: "https://www.bbc.co.uk/schedules/p00fzl86".to_string(),
        description: "BBC Radio 1 - Default fallback".to_string(),
    }]
}

/// Load the schedule sources. Never fails: an unreadable, malformed or empty
/// file falls back to [`default_sources`].
pub fn load_sources(path: &Path) -> Vec<ScheduleSource> {
    match read_sources(path) {
        Ok(sources) if !sources.is_empty() => {
            info!("Loaded {} schedule source(s) from {}", sources.len(), path.display());
            sources
        }
        Ok(_) => {
            warn!("{} lists no sources, using the default source", path.display());
            default_sources()
        }
        Err(e) => {
            warn!("Could not load schedule sources ({e:#}), using the default source");
            default_sources()
        }
    }
}

fn read_sources(path: &Path) -> anyhow::Result<Vec<ScheduleSource>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    let file: SourcesFile =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(file.sources)
}
