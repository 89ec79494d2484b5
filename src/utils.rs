//! Utility functions for text cleanup, naming and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Whitespace normalization for scraped text
//! - Filename sanitization and slug generation
//! - Truncation for log lines and teaser text
//! - Run folder naming and output directory validation

use chrono::{DateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SLUG_STRIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SLUG_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").unwrap());

const FILENAME_FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_FILENAME_CHARS: usize = 200;
const MAX_SLUG_CHARS: usize = 90;

/// Collapse whitespace runs (including non-breaking spaces) to single spaces and trim.
pub fn safe_text(s: &str) -> String {
    let s = s.replace('\u{a0}', " ");
    WHITESPACE_RE.replace_all(&s, " ").trim().to_string()
}

/// Turn a title into a filesystem-safe file stem.
///
/// Characters that are invalid on common filesystems are dropped,
/// leading/trailing dots and spaces are trimmed, and spaces become underscores.
/// Returns `None` when nothing usable is left, so callers can fall back to an
/// index-based name.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(sanitize_filename("A Journey: of Strength?"), Some("A_Journey_of_Strength".into()));
/// assert_eq!(sanitize_filename("???"), None);
/// ```
pub fn sanitize_filename(title: &str) -> Option<String> {
    let cleaned: String = title
        .chars()
        .filter(|c| !FILENAME_FORBIDDEN.contains(c))
        .collect();
    let capped: String = cleaned
        .trim_matches(|c| c == '.' || c == ' ')
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .take(MAX_FILENAME_CHARS)
        .collect();
    if capped.is_empty() { None } else { Some(capped) }
}

/// Convert a title to a URL-safe slug.
///
/// Lowercases the text, removes everything except word characters,
/// whitespace and hyphens, and collapses separator runs into one hyphen.
/// The result is capped at 90 characters and never empty.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("A Journey of Strength"), "a-journey-of-strength");
/// assert_eq!(slugify("  Hope -- & Healing_Story "), "hope-healing-story");
/// ```
pub fn slugify(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    let stripped = SLUG_STRIP_RE.replace_all(&lowered, "");
    let joined = SLUG_SEPARATOR_RE.replace_all(&stripped, "-");
    let capped: String = joined.trim_matches('-').chars().take(MAX_SLUG_CHARS).collect();
    let slug = capped.trim_end_matches('-');
    if slug.is_empty() {
        "story".to_string()
    } else {
        slug.to_string()
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// a count of the dropped characters appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let total = s.chars().count();
    if total <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}…(+{} chars)", head, total - max)
    }
}

/// Shorten text to at most `max` characters, cutting at a word boundary and
/// appending an ellipsis when anything was dropped.
pub fn truncate_words(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max).collect();
    let cut = match head.rfind(' ') {
        Some(idx) if idx > 0 => &head[..idx],
        _ => head.as_str(),
    };
    format!("{}…", cut.trim_end_matches(|c: char| c == ',' || c == ';' || c == ' '))
}

/// Capitalize the first character of a string.
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Name of the per-run folder, e.g. `ss_scrape_2025-05-06_083015PM`.
pub fn run_folder_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("ss_scrape_{}", at.format("%Y-%m-%d_%I%M%S%p"))
}

/// Whether a reference points at a remote resource rather than a local file.
pub fn is_remote(reference: &str) -> bool {
    let lower = reference.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    #[test]
    fn test_safe_text_collapses_whitespace() {
        assert_eq!(safe_text("  Hello\u{a0}\n\t world  "), "Hello world");
        assert_eq!(safe_text(""), "");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(
            sanitize_filename("A Journey: of Strength?"),
            Some("A_Journey_of_Strength".to_string())
        );
        assert_eq!(
            sanitize_filename("..Back/Slash\\ \"quoted\".."),
            Some("BackSlash_quoted".to_string())
        );
        assert_eq!(sanitize_filename("???"), None);
        assert_eq!(sanitize_filename(" . "), None);
    }

    #[test]
    fn test_sanitize_filename_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_filename(&long).unwrap().chars().count(), 200);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("A Journey of Strength"), "a-journey-of-strength");
        assert_eq!(slugify("  Hope -- & Healing_Story "), "hope-healing-story");
        assert_eq!(slugify("Baby's First Steps!"), "babys-first-steps");
        assert_eq!(slugify("!!!"), "story");
    }

    #[test]
    fn test_slugify_caps_length_without_trailing_hyphen() {
        let title = format!("{} end", "word ".repeat(30));
        let slug = slugify(&title);
        assert!(slug.chars().count() <= 90);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 100), "short");
        let result = truncate_for_log(&"a".repeat(500), 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 chars)"));
    }

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("short text", 50), "short text");
        assert_eq!(
            truncate_words("The quick brown fox jumps over", 18),
            "The quick brown…"
        );
    }

    #[test]
    fn test_upcase() {
        assert_eq!(upcase("hello"), "Hello");
        assert_eq!(upcase(""), "");
    }

    #[test]
    fn test_run_folder_name_uses_twelve_hour_clock() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let at = NaiveDate::from_ymd_opt(2025, 5, 6)
            .unwrap()
            .and_hms_opt(20, 30, 15)
            .unwrap()
            .and_local_timezone(tz)
            .unwrap();
        assert_eq!(run_folder_name(&at), "ss_scrape_2025-05-06_083015PM");
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.org/a.jpg"));
        assert!(is_remote("HTTP://example.org/a.jpg"));
        assert!(!is_remote("images/a.jpg"));
        assert!(!is_remote("/tmp/a.jpg"));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__probe_write__").exists());
    }
}
