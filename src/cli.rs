//! Command-line interface definitions for the success-stories pipeline.
//!
//! Arguments are parsed with `clap`; Storyblok credentials can also come
//! from the environment, and failing that from a `.env` file.

use clap::Parser;
use std::path::PathBuf;

/// Scrape success-story pages into JSON and upload them to Storyblok.
///
/// # Examples
///
/// ```sh
/// # Scrape two pages, then upload the results as drafts
/// success_stories --link https://example.org/a.aspx --link https://example.org/b.aspx
///
/// # Scrape a list of pages without uploading
/// success_stories --links-file links.txt --scrape-only
///
/// # Upload an earlier run and publish immediately
/// success_stories --upload-only ss_scrape_2025-05-06_083015PM/output --publish
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Story page URL to scrape (repeatable)
    #[arg(short, long = "link", value_name = "URL")]
    pub links: Vec<String>,

    /// File with one URL per line; blank lines and `#` comments are ignored
    #[arg(long, value_name = "PATH")]
    pub links_file: Option<PathBuf>,

    /// Scrape only, do not upload
    #[arg(long, conflicts_with = "upload_only")]
    pub scrape_only: bool,

    /// Upload an existing story JSON file, or every JSON file in a directory, without scraping
    #[arg(long, value_name = "JSON_OR_DIR", conflicts_with_all = ["links", "links_file"])]
    pub upload_only: Option<PathBuf>,

    /// Publish entries instead of saving them as drafts
    #[arg(long)]
    pub publish: bool,

    /// Storyblok asset folder for uploaded images
    #[arg(long, value_name = "ID")]
    pub asset_folder_id: Option<u64>,

    /// Directory the run folder is created in
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Storyblok management API token
    #[arg(long, env = "STORYBLOK_TOKEN", hide_env_values = true)]
    pub storyblok_token: Option<String>,

    /// Storyblok space id
    #[arg(long, env = "STORYBLOK_SPACE_ID")]
    pub storyblok_space_id: Option<String>,
}

impl Cli {
    /// Whether this invocation will talk to Storyblok.
    pub fn wants_upload(&self) -> bool {
        !self.scrape_only
    }
}
