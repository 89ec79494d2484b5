//! # Success Stories
//!
//! Scrapes hospital "Success Stories" pages into structured JSON and pushes
//! them to Storyblok as content entries.
//!
//! ## Usage
//!
//! ```sh
//! success_stories --links-file links.txt            # scrape, then upload drafts
//! success_stories --link <url> --scrape-only         # scrape only
//! success_stories --upload-only <json-or-dir> --publish
//! ```
//!
//! ## Architecture
//!
//! 1. **Input**: URLs from `--link` and `--links-file`, deduplicated
//! 2. **Scraping**: fetch, extract, download the hero image, write JSON
//!    (one URL at a time, failures counted and skipped)
//! 3. **Summary**: `summary.json` and `links_used.txt` in the run folder
//! 4. **Upload**: create or update one Storyblok entry per story JSON
//!
//! Run folder layout:
//!
//! ```text
//! <out-dir>/ss_scrape_<YYYY-MM-DD_HHMMSSAM>/
//! ├── links_used.txt
//! ├── summary.json
//! └── output/
//!     ├── <Title>.json
//!     └── images/<Title>.jpg
//! ```

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod models;
mod outputs;
mod pipeline;
mod run;
mod scrapers;
mod upload;
mod utils;

use cli::Cli;
use config::{Config, DotEnv};
use scrapers::http::HttpFetcher;
use upload::UploadOptions;
use upload::storyblok::StoryblokClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    debug!(?args.links, ?args.links_file, ?args.upload_only, ?args.out_dir, "Parsed CLI arguments");

    let result = run_pipeline(args).await;
    if let Err(e) = &result {
        error!(error = %e, "Run aborted");
    }
    result
}

#[instrument(level = "info", skip_all)]
async fn run_pipeline(args: Cli) -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    info!("success_stories starting up");

    let config = Config::load(args.config.as_deref())?;
    let dotenv = DotEnv::load();

    // Every fatal input problem surfaces here, before any page is fetched.
    let (plan, credentials) = pipeline::plan(&args, &dotenv).await?;

    let fetcher = HttpFetcher::new(&config.http)?;
    let client = credentials
        .as_ref()
        .map(|credentials| StoryblokClient::new(&config.storyblok, credentials))
        .transpose()?;
    let options = UploadOptions {
        publish: args.publish,
        asset_folder_id: args.asset_folder_id,
    };

    pipeline::execute(plan, &args.out_dir, &config, options, &fetcher, client.as_ref()).await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
