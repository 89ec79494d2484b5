//! Data models for scraped stories, run summaries and CMS payloads.
//!
//! This module defines the core data structures used throughout the application:
//! - [`StoryRecord`]: One extracted success story, persisted as JSON
//! - [`RunSummary`]: Per-run tally written to `summary.json`
//! - [`ImageRef`]: Where a story's hero image ended up after downloading
//! - [`AssetRef`]: A managed asset as referenced from a CMS entry

use serde::{Deserialize, Serialize};

/// Title used when no extraction rule yields a title.
pub const UNTITLED: &str = "Untitled";

/// A single success story as extracted from its source page.
///
/// Created once per input URL by the extractor, written to disk by the story
/// writer and consumed read-only by the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRecord {
    /// The page the story was scraped from. Never empty.
    pub source_url: String,
    /// Story headline; [`UNTITLED`] when the page yields nothing usable.
    pub title: String,
    /// Publication date, `YYYY-MM-DD` when it could be normalized.
    pub date: Option<String>,
    /// Short teaser text.
    pub description: Option<String>,
    /// Body paragraphs joined by a blank line.
    pub body_text: String,
    /// Local path (relative to the JSON file) or remote URL of the hero image.
    pub hero_image: Option<String>,
}

/// Result of trying to download a hero image.
///
/// Downloading never fails the story: when the bytes cannot be fetched the
/// record keeps pointing at the remote image instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Saved under the run's output directory; the path is relative to it.
    Local(String),
    /// Left on the remote site.
    Remote(String),
}

impl ImageRef {
    /// The string stored in [`StoryRecord::hero_image`].
    pub fn into_reference(self) -> String {
        match self {
            ImageRef::Local(path) => path,
            ImageRef::Remote(url) => url,
        }
    }
}

/// A URL that could not be turned into a story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUrl {
    pub url: String,
    /// Short machine-readable failure class (`http`, `timeout`, `extraction`, ...).
    pub kind: String,
    /// HTTP status code, when the failure was an error response.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<u16>,
    pub message: String,
}

/// Machine-readable tally of one scrape run, written to `summary.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Local time the run started, RFC 3339.
    pub timestamp: String,
    /// Number of URLs attempted.
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// JSON filenames written to `output/`, in processing order.
    pub files: Vec<String>,
    pub errors: Vec<FailedUrl>,
}

impl RunSummary {
    pub fn new(timestamp: String, total: usize) -> Self {
        Self {
            timestamp,
            total,
            success_count: 0,
            failure_count: 0,
            files: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn record_success(&mut self, filename: String) {
        self.success_count += 1;
        self.files.push(filename);
    }

    pub fn record_failure(&mut self, failure: FailedUrl) {
        self.failure_count += 1;
        self.errors.push(failure);
    }
}

/// A managed asset as embedded in a Storyblok asset field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<u64>,
    /// Public URL of the asset.
    pub filename: String,
    pub fieldtype: String,
}

impl AssetRef {
    pub fn new(id: Option<u64>, filename: impl Into<String>) -> Self {
        Self {
            id,
            filename: filename.into(),
            fieldtype: "asset".to_string(),
        }
    }
}

/// Counts for one upload batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_story() -> StoryRecord {
        StoryRecord {
            source_url: "https://hospitals.aku.edu/pakistan/stories/a.aspx".to_string(),
            title: "A Journey of Strength".to_string(),
            date: Some("2024-03-01".to_string()),
            description: None,
            body_text: "First.\n\nSecond.".to_string(),
            hero_image: Some("images/A_Journey_of_Strength.jpg".to_string()),
        }
    }

    #[test]
    fn test_story_serializes_absent_fields_as_null() {
        let json = serde_json::to_value(sample_story()).unwrap();
        assert!(json["description"].is_null());
        assert_eq!(json["date"], "2024-03-01");
        assert_eq!(json["title"], "A Journey of Strength");
    }

    #[test]
    fn test_story_deserializes_null_fields() {
        let json = r#"{
            "source_url": "https://example.org/pages/x.aspx",
            "title": "X",
            "date": null,
            "description": "teaser",
            "body_text": "body",
            "hero_image": null
        }"#;
        let story: StoryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(story.description.as_deref(), Some("teaser"));
        assert!(story.hero_image.is_none());
        assert!(story.date.is_none());
    }

    #[test]
    fn test_image_ref_into_reference() {
        assert_eq!(
            ImageRef::Local("images/a.jpg".to_string()).into_reference(),
            "images/a.jpg"
        );
        let remote = ImageRef::Remote("https://example.org/a.jpg".to_string());
        assert_eq!(remote.into_reference(), "https://example.org/a.jpg");
    }

    #[test]
    fn test_run_summary_counters() {
        let mut summary = RunSummary::new("2025-01-01T00:00:00+00:00".to_string(), 2);
        summary.record_success("A.json".to_string());
        summary.record_failure(FailedUrl {
            url: "https://example.org/b".to_string(),
            kind: "http".to_string(),
            status: Some(404),
            message: "HTTP 404".to_string(),
        });
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.files, vec!["A.json"]);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["success_count"], 1);
        assert_eq!(json["errors"][0]["status"], 404);
    }

    #[test]
    fn test_asset_ref_shape() {
        let asset = AssetRef::new(Some(42), "https://a.storyblok.com/f/1/x.jpg");
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["fieldtype"], "asset");
        assert_eq!(json["id"], 42);

        let no_id = serde_json::to_value(AssetRef::new(None, "https://x/y.png")).unwrap();
        assert!(no_id.get("id").is_none());
    }
}
