//! Per-story JSON files.
//!
//! Each successfully scraped page becomes one pretty-printed JSON file in
//! the run's `output/` directory. Files are named after the sanitized title;
//! an existing file is never overwritten, a numeric suffix is added instead.

use crate::models::StoryRecord;
use crate::utils::sanitize_filename;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum StoryFileError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid story JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// File stem for a story: the sanitized title, or `story_<index>` when the
/// title has no usable characters.
pub fn story_file_stem(title: &str, index: usize) -> String {
    sanitize_filename(title).unwrap_or_else(|| format!("story_{index}"))
}

/// Write `story` to `<output_dir>/<stem>.json`, or `<stem>_<n>.json` if that
/// name is taken. Returns the path written.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), %stem))]
pub async fn write_story(
    story: &StoryRecord,
    output_dir: &Path,
    stem: &str,
) -> Result<PathBuf, StoryFileError> {
    let json = serde_json::to_string_pretty(story).map_err(|source| StoryFileError::Json {
        path: output_dir.join(format!("{stem}.json")),
        source,
    })?;

    let mut counter = 0usize;
    loop {
        let filename = if counter == 0 {
            format!("{stem}.json")
        } else {
            format!("{stem}_{counter}.json")
        };
        let path = output_dir.join(filename);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(mut file) => {
                let io_err = |source| StoryFileError::Io {
                    path: path.clone(),
                    source,
                };
                file.write_all(json.as_bytes()).await.map_err(io_err)?;
                file.flush().await.map_err(io_err)?;
                debug!(path = %path.display(), "Wrote story JSON");
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(source) => return Err(StoryFileError::Io { path, source }),
        }
    }
}

/// Read a story JSON file written by [`write_story`].
pub async fn read_story(path: &Path) -> Result<StoryRecord, StoryFileError> {
    let content = fs::read_to_string(path).await.map_err(|source| StoryFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StoryFileError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Story files to upload for a path given on the command line: the file
/// itself, or every `*.json` directly inside a directory, sorted by name.
pub async fn collect_story_files(path: &Path) -> Result<Vec<PathBuf>, StoryFileError> {
    let io_err = |source| StoryFileError::Io {
        path: path.to_path_buf(),
        source,
    };
    let meta = fs::metadata(path).await.map_err(io_err)?;
    if !meta.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut entries = fs::read_dir(path).await.map_err(io_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let entry_path = entry.path();
        let is_json = entry_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json && entry.file_type().await.map_err(io_err)?.is_file() {
            files.push(entry_path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(title: &str) -> StoryRecord {
        StoryRecord {
            source_url: "https://example.org/pages/story.aspx".to_string(),
            title: title.to_string(),
            date: Some("2024-01-31".to_string()),
            description: Some("Teaser with ünïcödé".to_string()),
            body_text: "Para one.\n\nPara two.".to_string(),
            hero_image: Some("images/hero.jpg".to_string()),
        }
    }

    #[test]
    fn test_story_file_stem() {
        assert_eq!(story_file_stem("A Journey of Strength", 1), "A_Journey_of_Strength");
        assert_eq!(story_file_stem("***", 7), "story_7");
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let original = story("Round Trip");
        let path = write_story(&original, tmp.path(), "Round_Trip").await.unwrap();
        assert_eq!(path, tmp.path().join("Round_Trip.json"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("ünïcödé"), "non-ASCII text is written verbatim");

        let back = read_story(&path).await.unwrap();
        assert_eq!(back, original);
    }

    #[tokio::test]
    async fn test_identical_titles_produce_distinct_files() {
        let tmp = tempfile::tempdir().unwrap();
        let first = write_story(&story("Same"), tmp.path(), "Same").await.unwrap();
        let second = write_story(&story("Same"), tmp.path(), "Same").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(second, tmp.path().join("Same_1.json"));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_read_story_rejects_bad_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{\"title\": 1}").unwrap();
        assert!(matches!(read_story(&path).await, Err(StoryFileError::Json { .. })));
        assert!(matches!(
            read_story(&tmp.path().join("missing.json")).await,
            Err(StoryFileError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_collect_story_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("a.JSON"), "{}").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "").unwrap();
        std::fs::create_dir(tmp.path().join("images")).unwrap();

        let files = collect_story_files(tmp.path()).await.unwrap();
        assert_eq!(files, vec![tmp.path().join("a.JSON"), tmp.path().join("b.json")]);

        let single = tmp.path().join("b.json");
        assert_eq!(collect_story_files(&single).await.unwrap(), vec![single.clone()]);
        assert!(collect_story_files(&tmp.path().join("nope")).await.is_err());
    }
}
