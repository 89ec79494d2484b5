//! Hero image downloading.
//!
//! Images are saved under `output/images/` with a name derived from the
//! story title. Any failure (timeout, error status, non-image response,
//! write error) leaves the story pointing at the remote URL instead; the
//! story itself is never failed because of its image.

use super::PageSource;
use crate::models::ImageRef;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

/// Directory name under `output/` that holds downloaded images.
pub const IMAGES_DIR: &str = "images";

const KNOWN_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp"];

/// File extension for an image, preferring the URL suffix over the
/// declared content type. Defaults to `.jpg`.
pub fn image_extension(url: &str, content_type: Option<&str>) -> &'static str {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if let Some(ext) = KNOWN_EXTENSIONS.iter().find(|ext| path.ends_with(*ext)) {
        return *ext;
    }
    match content_type.unwrap_or_default() {
        ct if ct.contains("png") => ".png",
        ct if ct.contains("webp") => ".webp",
        ct if ct.contains("gif") => ".gif",
        _ => ".jpg",
    }
}

/// Download `url` into `images_dir` as `<base_name><ext>`.
///
/// Existing files are never overwritten; `_1`, `_2`, ... is appended to the
/// stem instead. On success the returned path is relative to the parent of
/// `images_dir`, i.e. to the directory the story JSON lives in.
#[instrument(level = "info", skip_all, fields(%url, %base_name))]
pub async fn download_image<S: PageSource>(
    source: &S,
    url: &str,
    images_dir: &Path,
    base_name: &str,
) -> ImageRef {
    let fetched = match source.fetch_bytes(url).await {
        Ok(fetched) => fetched,
        Err(e) => {
            warn!(error = %e, "Image download failed; keeping remote URL");
            return ImageRef::Remote(url.to_string());
        }
    };

    if let Some(ct) = fetched.content_type.as_deref() {
        if !ct.starts_with("image/") {
            warn!(content_type = %ct, "Response is not an image; keeping remote URL");
            return ImageRef::Remote(url.to_string());
        }
    }
    if fetched.bytes.is_empty() {
        warn!("Image response was empty; keeping remote URL");
        return ImageRef::Remote(url.to_string());
    }

    let ext = image_extension(url, fetched.content_type.as_deref());
    let mut filename = format!("{base_name}{ext}");
    let mut counter = 1;
    while fs::try_exists(images_dir.join(&filename)).await.unwrap_or(false) {
        filename = format!("{base_name}_{counter}{ext}");
        counter += 1;
    }

    let target = images_dir.join(&filename);
    if let Err(e) = fs::write(&target, &fetched.bytes).await {
        warn!(path = %target.display(), error = %e, "Failed to save image; keeping remote URL");
        return ImageRef::Remote(url.to_string());
    }

    let relative = format!("{IMAGES_DIR}/{filename}");
    info!(path = %relative, bytes = fetched.bytes.len(), "Saved hero image");
    ImageRef::Local(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing::StubSource;

    const IMG: &str = "https://example.org/PublishingImages/hero.png";

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("https://x.org/a.JPEG?w=1", None), ".jpeg");
        assert_eq!(image_extension("https://x.org/a.webp", Some("image/png")), ".webp");
        assert_eq!(image_extension("https://x.org/render?id=1", Some("image/png")), ".png");
        assert_eq!(image_extension("https://x.org/render?id=1", Some("image/gif")), ".gif");
        assert_eq!(image_extension("https://x.org/render", None), ".jpg");
    }

    #[tokio::test]
    async fn test_download_writes_file_and_returns_relative_path() {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join(IMAGES_DIR);
        std::fs::create_dir_all(&images).unwrap();
        let source = StubSource::new().with_resource(IMG, b"\x89PNG", Some("image/png"));

        let result = download_image(&source, IMG, &images, "A_Journey").await;
        assert_eq!(result, ImageRef::Local("images/A_Journey.png".to_string()));
        assert_eq!(std::fs::read(images.join("A_Journey.png")).unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn test_download_avoids_overwriting() {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join(IMAGES_DIR);
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("Same.png"), b"old").unwrap();
        let source = StubSource::new().with_resource(IMG, b"new", Some("image/png"));

        let first = download_image(&source, IMG, &images, "Same").await;
        let second = download_image(&source, IMG, &images, "Same").await;
        assert_eq!(first, ImageRef::Local("images/Same_1.png".to_string()));
        assert_eq!(second, ImageRef::Local("images/Same_2.png".to_string()));
        assert_eq!(std::fs::read(images.join("Same.png")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_unreachable_image_keeps_remote_url() {
        let tmp = tempfile::tempdir().unwrap();
        let source = StubSource::new();
        let result = download_image(&source, IMG, tmp.path(), "x").await;
        assert_eq!(result, ImageRef::Remote(IMG.to_string()));
    }

    #[tokio::test]
    async fn test_non_image_content_keeps_remote_url() {
        let tmp = tempfile::tempdir().unwrap();
        let source = StubSource::new().with_resource(IMG, b"<html>", Some("text/html"));
        let result = download_image(&source, IMG, tmp.path(), "x").await;
        assert_eq!(result, ImageRef::Remote(IMG.to_string()));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
