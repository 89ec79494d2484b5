//! Run-level artifacts: `summary.json` and `links_used.txt`.

use crate::models::RunSummary;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

pub const SUMMARY_FILE: &str = "summary.json";
pub const LINKS_FILE: &str = "links_used.txt";

/// Write the run summary as pretty JSON into the run directory.
#[instrument(level = "info", skip_all, fields(run_dir = %run_dir.display()))]
pub async fn write_summary(summary: &RunSummary, run_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let path = run_dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run summary");
    Ok(path)
}

/// Record the URLs of this run, one per line, in processing order.
pub async fn write_links_used(urls: &[String], run_dir: &Path) -> std::io::Result<PathBuf> {
    let path = run_dir.join(LINKS_FILE);
    let mut content = urls.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fs::write(&path, content).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let mut summary = RunSummary::new("2025-05-06T20:30:15+05:00".to_string(), 1);
        summary.record_success("A.json".to_string());

        let path = write_summary(&summary, tmp.path()).await.unwrap();
        let back: RunSummary = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, summary);
    }

    #[tokio::test]
    async fn test_write_links_used() {
        let tmp = tempfile::tempdir().unwrap();
        let urls = vec!["https://a.org/1".to_string(), "https://a.org/2".to_string()];
        let path = write_links_used(&urls, tmp.path()).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "https://a.org/1\nhttps://a.org/2\n"
        );

        let empty = write_links_used(&[], tmp.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(empty).unwrap(), "");
    }
}
