//! Mode selection and dispatch.
//!
//! [`plan`] turns the parsed arguments into a [`Plan`] and settles every
//! fatal input problem (credentials, links file, empty URL list, empty
//! upload directory) before anything is fetched. [`execute`] then runs the
//! plan against a page source and an optional content backend.

use crate::cli::Cli;
use crate::config::{Config, Credentials, DotEnv};
use crate::outputs::json::collect_story_files;
use crate::run;
use crate::scrapers::PageSource;
use crate::upload::{ContentBackend, UploadOptions, Uploader};
use crate::utils::ensure_writable_dir;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Scrape these URLs, then upload the results when a backend is given.
    Scrape { urls: Vec<String> },
    /// Upload existing story files without scraping.
    Upload { files: Vec<PathBuf> },
}

/// Validate the invocation. Credentials are `Some` exactly when the run
/// will upload.
pub async fn plan(args: &Cli, dotenv: &DotEnv) -> Result<(Plan, Option<Credentials>), Box<dyn Error>> {
    let credentials = if args.wants_upload() {
        let credentials = Credentials::resolve(
            args.storyblok_token.as_deref(),
            args.storyblok_space_id.as_deref(),
            dotenv,
        )?;
        info!(space_id = credentials.space_id, "Storyblok credentials loaded");
        Some(credentials)
    } else {
        None
    };

    if let Some(target) = &args.upload_only {
        let files = collect_story_files(target).await?;
        if files.is_empty() {
            return Err(format!("no story JSON files found in {}", target.display()).into());
        }
        info!(count = files.len(), path = %target.display(), "Uploading existing story files");
        return Ok((Plan::Upload { files }, credentials));
    }

    let from_file = match &args.links_file {
        Some(path) => run::read_links_file(path)
            .await
            .map_err(|e| format!("cannot read links file {}: {e}", path.display()))?,
        None => Vec::new(),
    };
    let urls = run::collect_urls(from_file, &args.links);
    if urls.is_empty() {
        return Err("no URLs to scrape: pass --link, --links-file or --upload-only".into());
    }
    Ok((Plan::Scrape { urls }, credentials))
}

pub async fn execute<S, B>(
    plan: Plan,
    out_dir: &Path,
    config: &Config,
    options: UploadOptions,
    source: &S,
    backend: Option<&B>,
) -> Result<(), Box<dyn Error>>
where
    S: PageSource,
    B: ContentBackend,
{
    match plan {
        Plan::Upload { files } => {
            let backend = backend.ok_or("upload requested without a Storyblok backend")?;
            upload_files(config, options, source, backend, &files).await
        }
        Plan::Scrape { urls } => {
            if let Err(e) = ensure_writable_dir(out_dir).await {
                error!(
                    path = %out_dir.display(),
                    error = %e,
                    "Output directory is not writable (fix perms or choose a different path)"
                );
                return Err(e.into());
            }

            let outcome = run::run_scrape(source, &urls, out_dir).await?;
            info!(
                run_dir = %outcome.paths.root.display(),
                succeeded = outcome.summary.success_count,
                failed = outcome.summary.failure_count,
                "Scrape finished"
            );
            match backend {
                Some(_) if outcome.json_paths.is_empty() => warn!("No stories were scraped; skipping upload"),
                Some(backend) => upload_files(config, options, source, backend, &outcome.json_paths).await?,
                None => info!(output = %outcome.paths.output.display(), "Scrape-only run; upload skipped"),
            }
            Ok(())
        }
    }
}

async fn upload_files<S, B>(
    config: &Config,
    options: UploadOptions,
    source: &S,
    backend: &B,
    files: &[PathBuf],
) -> Result<(), Box<dyn Error>>
where
    S: PageSource,
    B: ContentBackend,
{
    let uploader = Uploader::new(backend, source, &config.storyblok, options);
    let summary = uploader.upload_batch(files).await?;
    if summary.failed > 0 {
        warn!(failed = summary.failed, total = summary.total, "Some stories were not uploaded");
    }
    Ok(())
}
