//! Scrape run orchestration.
//!
//! A run walks the input URLs one at a time:
//!
//! ```text
//! INIT -> (FETCH -> EXTRACT -> DOWNLOAD_IMAGE -> WRITE)* -> SUMMARIZE -> DONE
//! ```
//!
//! A failure while fetching, extracting or writing a story is recorded in
//! the summary and the run moves on to the next URL. The run directory,
//! `links_used.txt` and `summary.json` are produced even when every URL fails.

use crate::models::{FailedUrl, RunSummary};
use crate::outputs::json::{StoryFileError, story_file_stem, write_story};
use crate::outputs::summary::{write_links_used, write_summary};
use crate::scrapers::extract::{ExtractionError, extract_story};
use crate::scrapers::images::{IMAGES_DIR, download_image};
use crate::scrapers::{FetchError, PageSource};
use crate::utils::run_folder_name;
use chrono::{DateTime, Local};
use itertools::Itertools;
use std::error::Error;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{error, info, instrument};

/// Directories of one scrape run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// `ss_scrape_<timestamp>/`
    pub root: PathBuf,
    /// `<root>/output/`, holds the story JSON files.
    pub output: PathBuf,
    /// `<root>/output/images/`
    pub images: PathBuf,
}

impl RunPaths {
    pub fn new(base_dir: &Path, started: &DateTime<Local>) -> Self {
        let root = base_dir.join(run_folder_name(started));
        let output = root.join("output");
        let images = output.join(IMAGES_DIR);
        Self { root, output, images }
    }

    pub async fn create(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.images).await
    }
}

/// Why a single URL did not produce a story.
#[derive(Error, Debug)]
pub enum StoryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractionError),
    #[error(transparent)]
    Write(#[from] StoryFileError),
}

impl StoryError {
    fn to_failure(&self, url: &str) -> FailedUrl {
        let (kind, status) = match self {
            StoryError::Fetch(e) => (e.kind(), e.status()),
            StoryError::Extract(_) => ("extraction", None),
            StoryError::Write(_) => ("write", None),
        };
        FailedUrl {
            url: url.to_string(),
            kind: kind.to_string(),
            status,
            message: self.to_string(),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct ScrapeOutcome {
    pub paths: RunPaths,
    pub summary: RunSummary,
    /// Story JSON files written, in processing order.
    pub json_paths: Vec<PathBuf>,
}

/// Parse a links file: one URL per line, blank lines and `#` comments ignored.
pub fn parse_links(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read and parse a links file.
pub async fn read_links_file(path: &Path) -> std::io::Result<Vec<String>> {
    let bytes = fs::read(path).await?;
    Ok(parse_links(&String::from_utf8_lossy(&bytes)))
}

/// Merge links-file URLs and `--link` values, dropping blanks and duplicates
/// while keeping first-seen order.
pub fn collect_urls(from_file: Vec<String>, from_args: &[String]) -> Vec<String> {
    from_file
        .into_iter()
        .chain(from_args.iter().cloned())
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .unique()
        .collect()
}

/// Fetch, extract, download the hero image and write one story.
#[instrument(level = "info", skip_all, fields(%url, index))]
async fn scrape_one<S: PageSource>(
    source: &S,
    url: &str,
    index: usize,
    paths: &RunPaths,
) -> Result<PathBuf, StoryError> {
    let html = source.fetch_html(url).await?;
    let mut story = extract_story(&html, url)?;
    let stem = story_file_stem(&story.title, index);

    if let Some(remote) = story.hero_image.take() {
        let image = download_image(source, &remote, &paths.images, &stem).await;
        story.hero_image = Some(image.into_reference());
    }

    let path = write_story(&story, &paths.output, &stem).await?;
    info!(
        title = %story.title,
        date = ?story.date,
        hero_image = ?story.hero_image,
        body_chars = story.body_text.chars().count(),
        "Saved story"
    );
    Ok(path)
}

/// Scrape every URL into a fresh run directory under `base_dir`.
///
/// Only failing to create the run directory or its run-level files aborts
/// the run; per-URL failures are counted in the returned summary.
#[instrument(level = "info", skip_all, fields(base_dir = %base_dir.display(), urls = urls.len()))]
pub async fn run_scrape<S: PageSource>(
    source: &S,
    urls: &[String],
    base_dir: &Path,
) -> Result<ScrapeOutcome, Box<dyn Error>> {
    let started = Local::now();
    let paths = RunPaths::new(base_dir, &started);
    paths.create().await?;
    info!(run_dir = %paths.root.display(), "Run folder created");

    write_links_used(urls, &paths.root).await?;

    let total = urls.len();
    let mut summary = RunSummary::new(started.to_rfc3339(), total);
    let mut json_paths = Vec::new();

    for (i, url) in urls.iter().enumerate() {
        let index = i + 1;
        info!("[{index}/{total}] Scraping: {url}");
        match scrape_one(source, url, index, &paths).await {
            Ok(path) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                summary.record_success(filename);
                json_paths.push(path);
            }
            Err(e) => {
                let failure = e.to_failure(url);
                error!(%url, kind = %failure.kind, error = %e, "Page skipped");
                summary.record_failure(failure);
            }
        }
    }

    let summary_path = write_summary(&summary, &paths.root).await?;
    info!("================ SUMMARY ================");
    info!("Total URLs    : {}", summary.total);
    info!("Success       : {}", summary.success_count);
    info!("Failed        : {}", summary.failure_count);
    info!("Output folder : {}", paths.output.display());
    info!("Summary saved : {}", summary_path.display());
    info!("=========================================");

    Ok(ScrapeOutcome {
        paths,
        summary,
        json_paths,
    })
}
