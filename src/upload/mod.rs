//! Pushing scraped stories to the CMS.
//!
//! One upload batch looks like this:
//!
//! ```text
//! ensure folder path (once)
//!   └─ per story JSON
//!        ├─ read + validate title
//!        ├─ resolve hero image ─┬─ local file  → asset upload
//!        │                      └─ remote URL  → pass through (or re-host)
//!        ├─ map fields onto the content type
//!        └─ find entry by full slug → update, else create
//! ```
//!
//! Failures inside a story are logged and counted; the batch moves on.
//! Failing to resolve the destination folder aborts the batch, since no
//! story could be placed.
//!
//! The CMS is reached through [`ContentBackend`]; [`storyblok`] holds the
//! management API client used in production.

pub mod retry;
pub mod storyblok;

use crate::config::{FieldMapping, StoryblokConfig};
use crate::models::{AssetRef, StoryRecord, UploadSummary};
use crate::outputs::json::{StoryFileError, read_story};
use crate::scrapers::PageSource;
use crate::scrapers::images::image_extension;
use crate::utils::{is_remote, slugify, truncate_for_log};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("credentials rejected by backend (HTTP {status})")]
    Unauthorized { status: u16 },
    #[error("backend rejected the request (HTTP 422): {body}")]
    Rejected { body: String },
    #[error("backend returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected backend response: {0}")]
    Schema(String),
    #[error("failed to set up HTTP client: {0}")]
    Client(String),
    #[error(transparent)]
    Story(#[from] StoryFileError),
    #[error("story in {path} has no title")]
    MissingTitle { path: PathBuf },
}

impl UploadError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => UploadError::Unauthorized { status },
            422 => UploadError::Rejected { body },
            _ => UploadError::Api { status, body },
        }
    }

    /// Transient failures worth another attempt: network errors, 429, 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Network { .. } => true,
            UploadError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// A folder entry in the content tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub full_slug: String,
    /// `None` or `0` both mean "space root".
    #[serde(default)]
    pub parent_id: Option<u64>,
}

impl Folder {
    pub fn parent(&self) -> u64 {
        self.parent_id.unwrap_or(0)
    }
}

/// Identity of an existing content entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    pub id: u64,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub full_slug: String,
}

/// Entry payload sent on create and update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryDraft {
    pub name: String,
    pub slug: String,
    pub parent_id: u64,
    pub content: Map<String, Value>,
}

/// A binary asset on its way to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime: String,
    pub folder_id: Option<u64>,
}

/// Operations the uploader needs from a headless CMS.
pub trait ContentBackend {
    /// Every folder in the space.
    async fn list_folders(&self) -> Result<Vec<Folder>, UploadError>;

    async fn create_folder(&self, name: &str, slug: &str, parent_id: u64) -> Result<Folder, UploadError>;

    /// Look up an entry by its full slug (`<folder>/<slug>`).
    async fn find_entry(&self, full_slug: &str) -> Result<Option<EntryRef>, UploadError>;

    async fn create_entry(&self, draft: &EntryDraft, publish: bool) -> Result<EntryRef, UploadError>;

    async fn update_entry(&self, id: u64, draft: &EntryDraft, publish: bool) -> Result<EntryRef, UploadError>;

    async fn upload_asset(&self, asset: AssetUpload) -> Result<AssetRef, UploadError>;

    /// Link to the entry in the backend's editor, when there is one.
    fn editor_url(&self, _entry_id: u64) -> Option<String> {
        None
    }
}

/// Folder that new entries are placed in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FolderTarget {
    /// `0` is the space root.
    pub id: u64,
    pub full_slug: String,
}

impl FolderTarget {
    fn descend(&self, folder: &Folder) -> Self {
        let full_slug = if folder.full_slug.is_empty() {
            join_slug(&self.full_slug, &folder.slug)
        } else {
            folder.full_slug.trim_end_matches('/').to_string()
        };
        Self { id: folder.id, full_slug }
    }

    /// Full slug of an entry named `slug` inside this folder.
    pub fn entry_slug(&self, slug: &str) -> String {
        join_slug(&self.full_slug, slug)
    }
}

fn join_slug(parent: &str, slug: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        slug.to_string()
    } else {
        format!("{parent}/{slug}")
    }
}

/// What happened to a single story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Created(EntryRef),
    Updated(EntryRef),
}

/// Per-invocation switches from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub publish: bool,
    pub asset_folder_id: Option<u64>,
}

/// `description`, a blank line, then `body`; either side may be empty.
pub fn combine_description(description: Option<&str>, body: &str) -> String {
    let description = description.map(str::trim).unwrap_or_default();
    let body = body.trim();
    match (description.is_empty(), body.is_empty()) {
        (false, false) => format!("{description}\n\n{body}"),
        (false, true) => description.to_string(),
        _ => body.to_string(),
    }
}

/// Map a story onto the configured content type.
pub fn build_content(
    content_type: &str,
    fields: &FieldMapping,
    story: &StoryRecord,
    image: Option<&AssetRef>,
) -> Map<String, Value> {
    let mut content = Map::new();
    content.insert("component".to_string(), Value::from(content_type));
    content.insert(fields.title.clone(), Value::from(story.title.trim()));

    match &fields.body {
        Some(body_field) => {
            let description = story.description.as_deref().map(str::trim).unwrap_or_default();
            content.insert(fields.description.clone(), Value::from(description));
            content.insert(body_field.clone(), Value::from(story.body_text.trim()));
        }
        None => {
            let combined = combine_description(story.description.as_deref(), &story.body_text);
            content.insert(fields.description.clone(), Value::from(combined));
        }
    }

    if let Some(asset) = image {
        let value = serde_json::to_value(asset).unwrap_or(Value::Null);
        content.insert(fields.image.clone(), value);
    }
    content
}

/// Where a relative `hero_image` reference lives: next to the JSON file,
/// next to its parent directory, or as given.
pub fn locate_local_image(json_path: &Path, reference: &str) -> PathBuf {
    let given = PathBuf::from(reference);
    if given.is_absolute() {
        return given;
    }
    let json_dir = json_path.parent().unwrap_or_else(|| Path::new(""));
    let beside = json_dir.join(reference);
    if beside.exists() {
        return beside;
    }
    if let Some(parent) = json_dir.parent() {
        let above = parent.join(reference);
        if above.exists() {
            return above;
        }
    }
    given
}

/// MIME type for an image file, by extension. Defaults to JPEG.
pub fn image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// Uploads story files through a [`ContentBackend`].
///
/// `source` is only used to download remote hero images when
/// `rehost_remote_images` is enabled.
pub struct Uploader<'a, B, S> {
    backend: &'a B,
    source: &'a S,
    config: &'a StoryblokConfig,
    options: UploadOptions,
}

impl<'a, B, S> Uploader<'a, B, S>
where
    B: ContentBackend,
    S: PageSource,
{
    pub fn new(backend: &'a B, source: &'a S, config: &'a StoryblokConfig, options: UploadOptions) -> Self {
        Self {
            backend,
            source,
            config,
            options,
        }
    }

    /// Find or create every segment of the configured folder path.
    #[instrument(level = "info", skip_all, fields(path = ?self.config.folder_path))]
    pub async fn ensure_folder_path(&self) -> Result<FolderTarget, UploadError> {
        let mut target = FolderTarget::default();
        if self.config.folder_path.is_empty() {
            return Ok(target);
        }

        let mut folders = self.backend.list_folders().await?;
        for name in &self.config.folder_path {
            let existing = folders.iter().find(|f| f.name == *name && f.parent() == target.id);
            target = match existing {
                Some(folder) => target.descend(folder),
                None => {
                    let created = self.backend.create_folder(name, &slugify(name), target.id).await?;
                    info!(folder = %name, id = created.id, "Created folder");
                    let next = target.descend(&created);
                    folders.push(created);
                    next
                }
            };
        }
        info!(id = target.id, full_slug = %target.full_slug, "Destination folder ready");
        Ok(target)
    }

    /// Upload every file, counting outcomes. Only a folder failure is fatal.
    #[instrument(level = "info", skip_all, fields(files = files.len()))]
    pub async fn upload_batch(&self, files: &[PathBuf]) -> Result<UploadSummary, UploadError> {
        let mut summary = UploadSummary {
            total: files.len(),
            ..UploadSummary::default()
        };
        if files.is_empty() {
            return Ok(summary);
        }

        let folder = self.ensure_folder_path().await?;
        let total = files.len();
        for (i, path) in files.iter().enumerate() {
            info!("[{}/{}] Uploading: {}", i + 1, total, path.display());
            match self.upload_story(path, &folder).await {
                Ok(UploadOutcome::Created(_)) => summary.created += 1,
                Ok(UploadOutcome::Updated(_)) => summary.updated += 1,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Story upload failed");
                    summary.failed += 1;
                }
            }
        }

        info!("================ UPLOAD ================");
        info!("Stories : {}", summary.total);
        info!("Created : {}", summary.created);
        info!("Updated : {}", summary.updated);
        info!("Failed  : {}", summary.failed);
        info!("========================================");
        Ok(summary)
    }

    /// Create or update the entry for one story JSON file.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn upload_story(&self, path: &Path, folder: &FolderTarget) -> Result<UploadOutcome, UploadError> {
        let story = read_story(path).await?;
        let title = story.title.trim();
        if title.is_empty() {
            return Err(UploadError::MissingTitle {
                path: path.to_path_buf(),
            });
        }

        let slug = slugify(title);
        let image = self.resolve_image(&story, path, &slug).await;
        let content = build_content(&self.config.content_type, &self.config.fields, &story, image.as_ref());
        let draft = EntryDraft {
            name: title.to_string(),
            slug: slug.clone(),
            parent_id: folder.id,
            content,
        };

        let full_slug = folder.entry_slug(&slug);
        let outcome = match self.backend.find_entry(&full_slug).await? {
            Some(existing) => {
                let entry = self.backend.update_entry(existing.id, &draft, self.options.publish).await?;
                info!(id = entry.id, %full_slug, "Updated entry");
                UploadOutcome::Updated(entry)
            }
            None => {
                let entry = self.backend.create_entry(&draft, self.options.publish).await?;
                info!(id = entry.id, %full_slug, "Created entry");
                UploadOutcome::Created(entry)
            }
        };

        let id = match &outcome {
            UploadOutcome::Created(e) | UploadOutcome::Updated(e) => e.id,
        };
        if let Some(url) = self.backend.editor_url(id) {
            info!(editor = %url, published = self.options.publish, "Entry ready");
        }
        Ok(outcome)
    }

    /// Turn the story's `hero_image` into an asset reference. Every failure
    /// here degrades to "no image".
    async fn resolve_image(&self, story: &StoryRecord, json_path: &Path, slug: &str) -> Option<AssetRef> {
        let reference = story.hero_image.as_deref().map(str::trim).filter(|r| !r.is_empty())?;

        let upload = if is_remote(reference) {
            if !self.config.rehost_remote_images {
                return Some(AssetRef::new(None, reference));
            }
            self.fetch_remote_image(reference, slug).await?
        } else {
            self.read_local_image(json_path, reference).await?
        };

        let filename = upload.filename.clone();
        match self.backend.upload_asset(upload).await {
            Ok(asset) => {
                info!(%filename, url = %asset.filename, "Uploaded image");
                Some(asset)
            }
            Err(e) => {
                warn!(%filename, error = %e, "Image upload failed; continuing without image");
                None
            }
        }
    }

    async fn read_local_image(&self, json_path: &Path, reference: &str) -> Option<AssetUpload> {
        let path = locate_local_image(json_path, reference);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Image file not readable; continuing without image");
                return None;
            }
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.jpg".to_string());
        Some(AssetUpload {
            filename,
            bytes,
            mime: image_mime(&path).to_string(),
            folder_id: self.options.asset_folder_id,
        })
    }

    async fn fetch_remote_image(&self, url: &str, slug: &str) -> Option<AssetUpload> {
        let fetched = match self.source.fetch_bytes(url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(%url, error = %e, "Remote image download failed; continuing without image");
                return None;
            }
        };
        let mime = fetched.content_type.clone().unwrap_or_else(|| "image/jpeg".to_string());
        if !mime.starts_with("image/") || fetched.bytes.is_empty() {
            warn!(%url, content_type = %truncate_for_log(&mime, 60), "Remote resource is not an image");
            return None;
        }
        let ext = image_extension(url, Some(&mime));
        Some(AssetUpload {
            filename: format!("{slug}{ext}"),
            bytes: fetched.bytes,
            mime,
            folder_id: self.options.asset_folder_id,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`ContentBackend`].

    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Debug, Clone, PartialEq)]
    pub struct StoredEntry {
        pub id: u64,
        pub full_slug: String,
        pub draft: EntryDraft,
        pub published: bool,
    }

    #[derive(Default)]
    pub struct MemoryBackend {
        pub folders: RefCell<Vec<Folder>>,
        pub entries: RefCell<Vec<StoredEntry>>,
        pub assets: RefCell<Vec<AssetUpload>>,
        pub fail_assets: Cell<bool>,
        next_id: Cell<u64>,
    }

    impl MemoryBackend {
        pub fn new() -> Self {
            let backend = Self::default();
            backend.next_id.set(100);
            backend
        }

        fn allocate_id(&self) -> u64 {
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            id
        }

        fn full_slug_for(&self, parent_id: u64, slug: &str) -> String {
            let parent = self
                .folders
                .borrow()
                .iter()
                .find(|f| f.id == parent_id)
                .map(|f| f.full_slug.clone())
                .unwrap_or_default();
            join_slug(&parent, slug)
        }
    }

    impl ContentBackend for MemoryBackend {
        async fn list_folders(&self) -> Result<Vec<Folder>, UploadError> {
            Ok(self.folders.borrow().clone())
        }

        async fn create_folder(&self, name: &str, slug: &str, parent_id: u64) -> Result<Folder, UploadError> {
            let folder = Folder {
                id: self.allocate_id(),
                name: name.to_string(),
                slug: slug.to_string(),
                full_slug: self.full_slug_for(parent_id, slug),
                parent_id: Some(parent_id),
            };
            self.folders.borrow_mut().push(folder.clone());
            Ok(folder)
        }

        async fn find_entry(&self, full_slug: &str) -> Result<Option<EntryRef>, UploadError> {
            Ok(self
                .entries
                .borrow()
                .iter()
                .find(|e| e.full_slug == full_slug)
                .map(|e| EntryRef {
                    id: e.id,
                    slug: e.draft.slug.clone(),
                    full_slug: e.full_slug.clone(),
                }))
        }

        async fn create_entry(&self, draft: &EntryDraft, publish: bool) -> Result<EntryRef, UploadError> {
            let full_slug = self.full_slug_for(draft.parent_id, &draft.slug);
            if self.entries.borrow().iter().any(|e| e.full_slug == full_slug) {
                return Err(UploadError::from_status(422, "slug already taken".to_string()));
            }
            let id = self.allocate_id();
            self.entries.borrow_mut().push(StoredEntry {
                id,
                full_slug: full_slug.clone(),
                draft: draft.clone(),
                published: publish,
            });
            Ok(EntryRef {
                id,
                slug: draft.slug.clone(),
                full_slug,
            })
        }

        async fn update_entry(&self, id: u64, draft: &EntryDraft, publish: bool) -> Result<EntryRef, UploadError> {
            let mut entries = self.entries.borrow_mut();
            let entry = entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| UploadError::from_status(404, "not found".to_string()))?;
            entry.draft = draft.clone();
            entry.published = publish;
            Ok(EntryRef {
                id,
                slug: draft.slug.clone(),
                full_slug: entry.full_slug.clone(),
            })
        }

        async fn upload_asset(&self, asset: AssetUpload) -> Result<AssetRef, UploadError> {
            if self.fail_assets.get() {
                return Err(UploadError::from_status(500, "storage down".to_string()));
            }
            let id = self.allocate_id();
            let url = format!("https://assets.test/{id}/{}", asset.filename);
            self.assets.borrow_mut().push(asset);
            Ok(AssetRef::new(Some(id), url))
        }
    }
}
