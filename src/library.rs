/// The local downloads folder.
///
/// Matching an item to a file on disk is deliberately exact: a fixed set of
/// candidate names is generated from the item's title and the first one that
/// exists wins. There is no fuzzy or partial matching.
use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::models::ProgrammeItem;

/// Extensions treated as finished media, in match priority order.
pub const MEDIA_EXTENSIONS: &[&str] = &["mp3", "m4a", "mp4", "webm", "ogg", "wav", "flac", "aac"];

/// Suffixes of files the download tool leaves behind while working.
pub const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".json", ".tmp"];

pub fn is_partial(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

pub fn is_media(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
}

/// Make a title safe to use as a file name.
///
/// Control characters and `< > / \ |` are dropped, `:` becomes a space,
/// `?` and `*` are dropped, `"` becomes `'`, whitespace is collapsed.
pub fn sanitize_title(title: &str) -> String {
    sanitize_with(title, " ")
}

fn sanitize_with(title: &str, colon: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        match c {
            ':' => out.push_str(colon),
            '"' => out.push('\''),
            '?' | '*' | '<' | '>' | '/' | '\\' | '|' => {}
            c if c.is_whitespace() => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone)]
pub struct DownloadLibrary {
    dir: PathBuf,
}

impl DownloadLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File names a download of `item` could plausibly have been saved as.
    pub fn candidate_names(item: &ProgrammeItem) -> Vec<String> {
        let mut stems: Vec<String> = Vec::new();
        // Colons come out of some tools as " -" rather than a plain space.
        for title in [sanitize_title(&item.title), sanitize_with(&item.title, " -")] {
            if title.is_empty() || stems.contains(&title) {
                continue;
            }
            let mut variants = vec![title.clone(), title.replace(' ', "_"), title.replace(' ', "-")];
            if let Some(date) = item.broadcast_date {
                let date = date.format("%Y-%m-%d");
                variants.push(format!("{date} - {title}"));
                variants.push(format!("{title} - {date}"));
            }
            variants.push(format!("BBC - {title}"));
            variants.push(format!("{title} - BBC"));

            for v in variants {
                if !stems.contains(&v) {
                    stems.push(v);
                }
            }
        }

        MEDIA_EXTENSIONS
            .iter()
            .flat_map(|ext| stems.iter().map(move |stem| format!("{stem}.{ext}")))
            .collect()
    }

    /// Path of the first candidate file that exists, if any.
    pub fn check_status(&self, item: &ProgrammeItem) -> Option<PathBuf> {
        Self::candidate_names(item)
            .into_iter()
            .map(|name| self.dir.join(name))
            .find(|path| path.is_file())
    }

    /// Update the item's download fields from disk. Returns whether a file was found.
    pub fn annotate(&self, item: &mut ProgrammeItem) -> bool {
        match self.check_status(item) {
            Some(path) => {
                item.mark_downloaded(path);
                true
            }
            None => {
                item.clear_download();
                false
            }
        }
    }

    pub fn annotate_all(&self, items: &mut [ProgrammeItem]) {
        let found = items
            .iter_mut()
            .map(|item| self.annotate(item))
            .filter(|found| *found)
            .count();
        if found > 0 {
            debug!("{found} of {} item(s) already downloaded", items.len());
        }
    }

    /// Media files already in the folder, as items with no URL.
    pub fn scan_existing(&self) -> Vec<ProgrammeItem> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not scan {}: {e}", self.dir.display());
                return Vec::new();
            }
        };

        let mut items = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || is_partial(&path) || !is_media(&path) {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };

            let title = display_title(&stem);
            let date = date_from_filename(&stem).or_else(|| {
                entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.created().or_else(|_| m.modified()).ok())
                    .map(local_date)
            });

            items.push(ProgrammeItem {
                display_name: title.clone(),
                title,
                broadcast_date: date,
                is_downloaded: true,
                downloaded_file_path: Some(path),
                ..Default::default()
            });
        }

        items.sort_by(|a, b| a.title.cmp(&b.title));
        items
    }
}

/// Newest finished file in `dir`, by creation time where the platform
/// records it.
pub fn newest_file(dir: &Path) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter(|entry| entry.path().is_file() && !is_partial(&entry.path()))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            let at = meta.created().or_else(|_| meta.modified()).ok()?;
            Some((at, entry.path()))
        })
        .max_by_key(|(at, _)| *at)
        .map(|(_, path)| path)
}

fn local_date(at: SystemTime) -> NaiveDate {
    DateTime::<Local>::from(at).date_naive()
}

/// Readable title for a downloaded file's stem.
fn display_title(stem: &str) -> String {
    let mut title = stem;
    if title.get(..6).is_some_and(|p| p.eq_ignore_ascii_case("BBC - ")) {
        title = &title[6..];
    }
    let cut = title.len().saturating_sub(6);
    if title.get(cut..).is_some_and(|s| s.eq_ignore_ascii_case(" - BBC")) {
        title = &title[..cut];
    }
    title
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn date_from_filename(stem: &str) -> Option<NaiveDate> {
    static PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
        vec![
            (Regex::new(r"(\d{4}-\d{2}-\d{2})").unwrap(), "%Y-%m-%d"),
            (Regex::new(r"(\d{2}-\d{2}-\d{4})").unwrap(), "%d-%m-%Y"),
            (Regex::new(r"(\d{8})").unwrap(), "%Y%m%d"),
        ]
    });

    PATTERNS.iter().find_map(|(re, fmt)| {
        let caps = re.captures(stem)?;
        NaiveDate::parse_from_str(&caps[1], fmt).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str) -> ProgrammeItem {
        ProgrammeItem::new(title, "https://www.bbc.co.uk/programmes/m1")
    }

    #[test]
    fn sanitizes_awkward_titles() {
        assert_eq!(sanitize_title("Friday Night: Dance Mix"), "Friday Night Dance Mix");
        assert_eq!(sanitize_title("What?* \"Live\"  </set>"), "What 'Live' set");
        assert_eq!(sanitize_title("  AC/DC | Rock\tShow "), "ACDC Rock Show");
    }

    #[test]
    fn finds_sanitized_title_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("Friday Night Dance Mix.mp3");
        fs::write(&expected, b"audio").unwrap();

        let library = DownloadLibrary::new(dir.path());
        let mut show = item("Friday Night: Dance Mix");
        assert_eq!(library.check_status(&show), Some(expected.clone()));
        assert!(library.annotate(&mut show));
        assert!(show.is_downloaded);
        assert_eq!(show.downloaded_file_path, Some(expected));
    }

    #[test]
    fn finds_dated_and_decorated_variants() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("2025-01-11 - Essential_Mix.m4a"), b"").unwrap();
        fs::write(dir.path().join("BBC - Annie Mac.flac"), b"").unwrap();
        let library = DownloadLibrary::new(dir.path());

        let mut dated = item("Essential_Mix");
        dated.broadcast_date = NaiveDate::from_ymd_opt(2025, 1, 11);
        assert!(library.check_status(&dated).is_some());

        assert!(library.check_status(&item("Annie Mac")).is_some());
    }

    #[test]
    fn no_partial_matches() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Friday Night Dance Mix Part 2.mp3"), b"").unwrap();
        fs::write(dir.path().join("Friday Night Dance Mix.mp3.part"), b"").unwrap();
        let library = DownloadLibrary::new(dir.path());

        let mut show = item("Friday Night: Dance Mix");
        show.mark_downloaded("/stale/path.mp3");
        assert!(!library.annotate(&mut show));
        assert!(!show.is_downloaded);
        assert_eq!(show.downloaded_file_path, None);
    }

    #[test]
    fn candidates_cover_extensions_and_conventions() {
        let names = DownloadLibrary::candidate_names(&item("Late Show"));
        assert_eq!(names[0], "Late Show.mp3");
        for expected in ["Late_Show.m4a", "Late-Show.webm", "BBC - Late Show.aac", "Late Show - BBC.ogg"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert!(names.iter().all(|n| !n.contains("--")));
    }

    #[test]
    fn scans_existing_media_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("BBC - Essential_Mix-2025-01-11.mp3"), b"").unwrap();
        fs::write(dir.path().join("Late Show.m4a"), b"").unwrap();
        fs::write(dir.path().join("Late Show.m4a.part"), b"").unwrap();
        fs::write(dir.path().join("Late Show.info.json"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let items = DownloadLibrary::new(dir.path()).scan_existing();
        assert_eq!(items.len(), 2);

        let mix = &items[0];
        assert_eq!(mix.title, "Essential Mix 2025 01 11");
        assert_eq!(mix.broadcast_date, NaiveDate::from_ymd_opt(2025, 1, 11));
        assert!(mix.is_downloaded);
        assert!(mix.canonical_url.is_empty());

        let late = &items[1];
        assert_eq!(late.display_name, "Late Show");
        assert!(late.broadcast_date.is_some());
    }

    #[test]
    fn missing_folder_scans_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DownloadLibrary::new(dir.path().join("nope")).scan_existing().is_empty());
    }

    #[test]
    fn dates_from_filenames() {
        assert_eq!(date_from_filename("mix 2025-01-11"), NaiveDate::from_ymd_opt(2025, 1, 11));
        assert_eq!(date_from_filename("mix 11-01-2025"), NaiveDate::from_ymd_opt(2025, 1, 11));
        assert_eq!(date_from_filename("mix_20250111"), NaiveDate::from_ymd_opt(2025, 1, 11));
        assert_eq!(date_from_filename("mix 99999999"), None);
        assert_eq!(date_from_filename("mix"), None);
    }

    #[test]
    fn newest_file_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("done.mp3"), b"").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(dir.path().join("later.mp3.part"), b"").unwrap();
        assert_eq!(newest_file(dir.path()), Some(dir.path().join("done.mp3")));
    }
}
