/// Wrapper around the `yt-dlp` CLI.
///
/// One download runs at a time. `start` either admits a new session or
/// rejects the request outright; nothing is queued. Each session spawns the
/// tool, turns its output into [`DownloadEvent`]s and ends with exactly one
/// `Finished`.
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, Mutex},
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::{
    io::AsyncReadExt,
    process::{Child, Command},
    sync::{mpsc, watch},
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::DownloadError,
    library,
    models::{DownloadEvent, DownloadOutcome, EventLevel, ProgrammeItem, ProgressUpdate},
};

/// Lines of tool output kept for the failure message.
const TAIL_LINES: usize = 50;

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadState {
    Idle,
    Starting { url: String },
    Running { url: String },
    Completed { url: String, path: Option<PathBuf> },
    Failed { url: String, exit_code: Option<i32>, message: String },
    Cancelled { url: String },
}

impl DownloadState {
    /// A session is in flight and new starts are rejected.
    pub fn is_active(&self) -> bool {
        matches!(self, DownloadState::Starting { .. } | DownloadState::Running { .. })
    }

    fn finished(url: String, outcome: &DownloadOutcome) -> Self {
        match outcome {
            DownloadOutcome::Completed { path } => DownloadState::Completed {
                url,
                path: path.clone(),
            },
            DownloadOutcome::Failed { exit_code, message } => DownloadState::Failed {
                url,
                exit_code: *exit_code,
                message: message.clone(),
            },
            DownloadOutcome::Cancelled => DownloadState::Cancelled { url },
        }
    }
}

pub type DownloadEvents = UnboundedReceiverStream<DownloadEvent>;

// ── Downloader ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Downloader {
    inner: Arc<Inner>,
}

struct Inner {
    tool: PathBuf,
    output_dir: PathBuf,
    user_agent: String,
    state: watch::Sender<DownloadState>,
    /// Token of the active session. Locked around every admission and
    /// every terminal transition.
    cancel: Mutex<Option<CancellationToken>>,
}

impl Downloader {
    pub fn new(tool: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, user_agent: impl Into<String>) -> Self {
        let (state, _) = watch::channel(DownloadState::Idle);
        Self {
            inner: Arc::new(Inner {
                tool: tool.into(),
                output_dir: output_dir.into(),
                user_agent: user_agent.into(),
                state,
                cancel: Mutex::new(None),
            }),
        }
    }

    pub fn tool(&self) -> &Path {
        &self.inner.tool
    }

    pub fn is_available(&self) -> bool {
        self.inner.tool.is_file()
    }

    pub fn state(&self) -> DownloadState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DownloadState> {
        self.inner.state.subscribe()
    }

    /// Admit a new session for `url` and return its event stream.
    pub fn start(&self, url: &str) -> Result<DownloadEvents, DownloadError> {
        self.admit(url, None)
    }

    /// Like [`start`](Self::start) for a discovered programme. On success the
    /// stream carries the item back, marked as downloaded, before `Finished`.
    pub fn start_item(&self, item: ProgrammeItem) -> Result<DownloadEvents, DownloadError> {
        let url = item.canonical_url.clone();
        self.admit(&url, Some(item))
    }

    fn admit(&self, url: &str, item: Option<ProgrammeItem>) -> Result<DownloadEvents, DownloadError> {
        if !self.is_available() {
            return Err(DownloadError::ToolMissing(self.inner.tool.clone()));
        }

        let url = url.trim().to_string();
        let token = CancellationToken::new();
        {
            let mut slot = self.inner.cancel.lock().unwrap_or_else(|e| e.into_inner());
            let admitted = self.inner.state.send_if_modified(|state| {
                if state.is_active() {
                    return false;
                }
                *state = DownloadState::Starting { url: url.clone() };
                true
            });
            if !admitted {
                return Err(DownloadError::Busy);
            }
            *slot = Some(token.clone());
        }

        info!("Download starting: {url}");
        let (tx, rx) = mpsc::unbounded_channel();
        let session = DownloadSession {
            target_url: url,
            output_dir: self.inner.output_dir.clone(),
            cancel: token,
            item,
            detected_path: None,
            tail: Vec::new(),
        };
        tokio::spawn(self.clone().supervise(session, tx));

        Ok(UnboundedReceiverStream::new(rx))
    }

    /// Ask the active session to stop. The child is killed and the session
    /// ends with `Cancelled`.
    pub fn cancel(&self) -> Result<(), DownloadError> {
        let slot = self.inner.cancel.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(token) if self.inner.state.borrow().is_active() => {
                info!("Download cancellation requested");
                token.cancel();
                Ok(())
            }
            _ => Err(DownloadError::NotRunning),
        }
    }

    async fn supervise(self, mut session: DownloadSession, tx: mpsc::UnboundedSender<DownloadEvent>) {
        let outcome = self.run(&mut session, &tx).await;
        match &outcome {
            DownloadOutcome::Completed { path } => info!(
                "Download complete: {} -> {}",
                session.target_url,
                path.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "?".into())
            ),
            DownloadOutcome::Failed { message, .. } => warn!("Download failed: {}: {message}", session.target_url),
            DownloadOutcome::Cancelled => info!("Download cancelled: {}", session.target_url),
        }

        if let (DownloadOutcome::Completed { path: Some(path) }, Some(mut item)) = (&outcome, session.item.take()) {
            item.mark_downloaded(path);
            let _ = tx.send(DownloadEvent::Downloaded { item });
        }

        {
            let mut slot = self.inner.cancel.lock().unwrap_or_else(|e| e.into_inner());
            *slot = None;
            self.inner
                .state
                .send_replace(DownloadState::finished(session.target_url.clone(), &outcome));
        }
        let _ = tx.send(DownloadEvent::Finished(outcome));
    }

    async fn run(&self, session: &mut DownloadSession, tx: &mpsc::UnboundedSender<DownloadEvent>) -> DownloadOutcome {
        if session.cancel.is_cancelled() {
            return DownloadOutcome::Cancelled;
        }

        let mut child = match self.command(&session.target_url).spawn() {
            Ok(child) => child,
            Err(e) => {
                return DownloadOutcome::Failed {
                    exit_code: None,
                    message: format!("failed to start {}: {e}", self.inner.tool.display()),
                };
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            kill(&mut child).await;
            return DownloadOutcome::Failed {
                exit_code: None,
                message: "yt-dlp output was not captured".to_string(),
            };
        };

        self.inner.state.send_replace(DownloadState::Running {
            url: session.target_url.clone(),
        });

        let cancel = session.cancel.clone();
        let mut stdout_rx = spawn_line_reader(stdout);
        let mut stderr_rx = spawn_line_reader(stderr);
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    kill(&mut child).await;
                    return DownloadOutcome::Cancelled;
                }
                msg = stdout_rx.recv(), if !stdout_done => match msg {
                    Some(line) => session.handle_line(&line, tx),
                    None => stdout_done = true,
                },
                msg = stderr_rx.recv(), if !stderr_done => match msg {
                    Some(line) => session.handle_line(&line, tx),
                    None => stderr_done = true,
                },
            }
        }

        let exited = tokio::select! {
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };
        let Some(status) = exited else {
            kill(&mut child).await;
            return DownloadOutcome::Cancelled;
        };

        match status {
            Ok(status) if status.success() => DownloadOutcome::Completed {
                path: session.produced_file().await,
            },
            Ok(status) => DownloadOutcome::Failed {
                exit_code: status.code(),
                message: session.failure_message(status.code()),
            },
            Err(e) => DownloadOutcome::Failed {
                exit_code: None,
                message: format!("wait for yt-dlp: {e}"),
            },
        }
    }

    fn command(&self, url: &str) -> Command {
        let mut cmd = Command::new(&self.inner.tool);
        cmd.arg("--format")
            .arg("bestaudio")
            .arg("--output")
            .arg("%(title)s.%(ext)s")
            .arg("--user-agent")
            .arg(&self.inner.user_agent)
            // One progress update per line instead of redrawing in place.
            .arg("--newline")
            .arg(url)
            .current_dir(&self.inner.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill yt-dlp: {e}");
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

struct DownloadSession {
    target_url: String,
    output_dir: PathBuf,
    cancel: CancellationToken,
    item: Option<ProgrammeItem>,
    detected_path: Option<PathBuf>,
    tail: Vec<String>,
}

impl DownloadSession {
    /// The announced destination, else the newest finished file in the
    /// output directory.
    async fn produced_file(&mut self) -> Option<PathBuf> {
        if let Some(path) = self.detected_path.take() {
            return Some(path);
        }
        let dir = self.output_dir.clone();
        match tokio::task::spawn_blocking(move || library::newest_file(&dir)).await {
            Ok(path) => path,
            Err(e) => {
                warn!("Output directory scan failed: {e}");
                None
            }
        }
    }

    fn handle_line(&mut self, line: &str, tx: &mpsc::UnboundedSender<DownloadEvent>) {
        let event = classify_line(line);
        match &event {
            DownloadEvent::Progress(p) => tracing::debug!(
                "[yt-dlp] progress: {:.1}% speed={} eta={}",
                p.percent,
                p.speed.as_deref().unwrap_or("-"),
                p.eta.as_deref().unwrap_or("-"),
            ),
            DownloadEvent::Destination { path } => {
                info!("[yt-dlp] {line}");
                self.detected_path = Some(if path.is_absolute() {
                    path.clone()
                } else {
                    self.output_dir.join(path)
                });
            }
            _ => {
                info!("[yt-dlp] {line}");
                self.tail.push(line.to_string());
                if self.tail.len() > TAIL_LINES {
                    self.tail.remove(0);
                }
            }
        }
        let _ = tx.send(event);
    }

    fn failure_message(&self, code: Option<i32>) -> String {
        let errors: Vec<&str> = self
            .tail
            .iter()
            .map(String::as_str)
            .filter(|l| l.starts_with("ERROR"))
            .collect();
        let detail = if errors.is_empty() {
            self.tail.iter().rev().take(5).rev().cloned().collect::<Vec<_>>().join("\n")
        } else {
            errors.join("\n")
        };
        let head = match code {
            Some(code) => format!("yt-dlp exited with status {code}"),
            None => "yt-dlp was terminated by a signal".to_string(),
        };
        if detail.is_empty() { head } else { format!("{head}\n{detail}") }
    }
}

// ── Output parsing ────────────────────────────────────────────────────────────

/// Turn one line of tool output into an event.
pub fn classify_line(line: &str) -> DownloadEvent {
    if let Some(progress) = parse_progress_line(line) {
        return DownloadEvent::Progress(progress);
    }
    if let Some(path) = parse_destination(line) {
        return DownloadEvent::Destination { path };
    }
    let level = if line.starts_with("ERROR") {
        EventLevel::Error
    } else if line.starts_with("WARNING") {
        EventLevel::Warning
    } else {
        EventLevel::Info
    };
    DownloadEvent::Line {
        level,
        text: line.to_string(),
    }
}

/// `[download]  42.0% of ~ 55.20MiB at  1.31MiB/s ETA 00:32`
fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    static RE_PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[download\]\s+(\d+\.?\d*)%").unwrap());
    static RE_SPEED: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\d.]+\s*(?:[KMGT]i?[Bb])/s)").unwrap());
    static RE_ETA: Lazy<Regex> = Lazy::new(|| Regex::new(r"ETA:?\s+([\d:]+)").unwrap());
    static RE_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"of\s+~?\s*([\d.]+\s*(?:[KMGT]i?B))\b").unwrap());

    let caps = RE_PERCENT.captures(line)?;
    let percent = caps[1].parse::<f64>().ok()?;
    Some(ProgressUpdate {
        percent,
        speed: RE_SPEED.captures(line).map(|c| c[1].to_string()),
        eta: RE_ETA.captures(line).map(|c| c[1].to_string()),
        size: RE_SIZE.captures(line).map(|c| c[1].to_string()),
    })
}

/// File name announced by the tool, either as the download destination or
/// as a file that was already present.
fn parse_destination(line: &str) -> Option<PathBuf> {
    static RE_DESTINATION: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\[(?:download|ExtractAudio)\]\s+Destination:\s+(.+)$").unwrap());
    static RE_ALREADY: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\[download\]\s+(.+?)\s+has already been downloaded").unwrap());

    RE_DESTINATION
        .captures(line)
        .or_else(|| RE_ALREADY.captures(line))
        .map(|c| PathBuf::from(c[1].trim()))
}

/// Split a child's output into lines. Progress updates can end in `\r`
/// rather than `\n`, so both count as terminators.
fn spawn_line_reader(reader: impl tokio::io::AsyncRead + Send + Unpin + 'static) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut reader = reader;
        let mut chunk = vec![0u8; 4096];
        let mut buf: Vec<u8> = Vec::with_capacity(256);
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    for &b in &chunk[..n] {
                        if b == b'\r' || b == b'\n' {
                            flush_line(&mut buf, &tx);
                        } else {
                            buf.push(b);
                        }
                    }
                }
            }
        }
        flush_line(&mut buf, &tx);
    });
    rx
}

fn flush_line(buf: &mut Vec<u8>, tx: &mpsc::UnboundedSender<String>) {
    if buf.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(buf).trim().to_string();
    if !line.is_empty() {
        let _ = tx.send(line);
    }
    buf.clear();
}
