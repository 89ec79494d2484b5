//! Storyblok management API client.
//!
//! | Operation      | Request                                               |
//! |----------------|-------------------------------------------------------|
//! | list folders   | `GET  /spaces/{id}/stories?folder_only=1&page=N`      |
//! | create folder  | `POST /spaces/{id}/stories` with `is_folder: true`    |
//! | find entry     | `GET  /spaces/{id}/stories?with_slug=<full slug>`     |
//! | create entry   | `POST /spaces/{id}/stories`                           |
//! | update entry   | `PUT  /spaces/{id}/stories/{story_id}`                |
//! | upload asset   | `POST /spaces/{id}/assets`, then multipart to S3      |
//!
//! Every management call goes through [`Backoff`]. The signed S3 upload uses
//! a separate client that never sees the API token.

use super::retry::Backoff;
use super::{AssetUpload, ContentBackend, EntryDraft, EntryRef, Folder, UploadError};
use crate::config::{Credentials, StoryblokConfig};
use crate::models::AssetRef;
use crate::utils::truncate_for_log;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, instrument};

const PER_PAGE: usize = 100;
const SIGNED_UPLOAD_TIMEOUT: Duration = Duration::from_secs(180);
const EDITOR_BASE: &str = "https://app.storyblok.com/#/me/spaces";
const ERROR_BODY_CHARS: usize = 500;

#[derive(Deserialize)]
struct FolderList {
    #[serde(default)]
    stories: Vec<Folder>,
}

#[derive(Deserialize)]
struct EntryList {
    #[serde(default)]
    stories: Vec<EntryRef>,
}

#[derive(Deserialize)]
struct StoryEnvelope<T> {
    story: T,
}

/// Response of `POST /assets`: where and how to upload the file.
#[derive(Debug, Deserialize)]
struct SignedUpload {
    #[serde(default)]
    id: Option<u64>,
    post_url: String,
    fields: Map<String, Value>,
}

impl SignedUpload {
    fn key(&self) -> Result<String, UploadError> {
        self.fields
            .get("key")
            .map(field_text)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| UploadError::Schema("signed upload has no `key` field".to_string()))
    }
}

pub struct StoryblokClient {
    api: Client,
    storage: Client,
    api_base: String,
    asset_base: String,
    space_id: u64,
    backoff: Backoff,
}

impl StoryblokClient {
    pub fn new(config: &StoryblokConfig, credentials: &Credentials) -> Result<Self, UploadError> {
        let mut token = HeaderValue::from_str(&credentials.token)
            .map_err(|_| UploadError::Client("token is not a valid header value".to_string()))?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, token);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let api = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| UploadError::Client(e.to_string()))?;
        let storage = Client::builder()
            .timeout(SIGNED_UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| UploadError::Client(e.to_string()))?;

        Ok(Self {
            api,
            storage,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            asset_base: config.asset_base.trim_end_matches('/').to_string(),
            space_id: credentials.space_id,
            backoff: Backoff::new(config.max_attempts, Duration::from_secs(1)),
        })
    }

    fn space_url(&self, path: &str) -> String {
        format!("{}/spaces/{}{}", self.api_base, self.space_id, path)
    }

    fn public_asset_url(&self, key: &str) -> String {
        format!("{}/{}", self.asset_base, key.trim_start_matches('/'))
    }

    /// One management API call, retried on transient failures.
    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, UploadError> {
        let url = self.space_url(path);
        let what = format!("{method} {path}");
        let (url, method) = (url.as_str(), &method);

        self.backoff
            .retry(&what, move || async move {
                let mut request = self.api.request(method.clone(), url).query(query);
                if let Some(body) = body {
                    request = request.json(body);
                }
                let response = request.send().await.map_err(|source| UploadError::Network {
                    url: url.to_string(),
                    source,
                })?;
                read_json(url, response).await
            })
            .await
    }

    /// Multipart POST of the file to the signed storage URL.
    async fn post_signed(&self, signed: &SignedUpload, asset: &AssetUpload) -> Result<(), UploadError> {
        let post_url = signed.post_url.as_str();
        self.backoff
            .retry("POST signed upload", move || async move {
                let mut form = Form::new();
                for (name, value) in &signed.fields {
                    form = form.text(name.clone(), field_text(value));
                }
                let part = Part::bytes(asset.bytes.clone())
                    .file_name(asset.filename.clone())
                    .mime_str(&asset.mime)
                    .map_err(|e| UploadError::Client(e.to_string()))?;
                form = form.part("file", part);

                let response = self
                    .storage
                    .post(post_url)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|source| UploadError::Network {
                        url: post_url.to_string(),
                        source,
                    })?;
                let status = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                check_status(status, &text)
            })
            .await
    }
}

fn check_status(status: u16, text: &str) -> Result<(), UploadError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(UploadError::from_status(status, truncate_for_log(text, ERROR_BODY_CHARS)))
    }
}

/// Status check plus JSON decoding of a response body. An empty success
/// body decodes to `null`.
fn parse_body(url: &str, status: u16, text: &str) -> Result<Value, UploadError> {
    check_status(status, text)?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| UploadError::Schema(format!("{url}: {e}")))
}

async fn read_json(url: &str, response: Response) -> Result<Value, UploadError> {
    let status = response.status().as_u16();
    let text = response.text().await.map_err(|source| UploadError::Network {
        url: url.to_string(),
        source,
    })?;
    parse_body(url, status, &text)
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, UploadError> {
    serde_json::from_value(value).map_err(|e| UploadError::Schema(format!("{what}: {e}")))
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The signed payload is sometimes nested under `data`, and the asset id
/// under `asset`.
fn parse_signed_upload(value: Value) -> Result<SignedUpload, UploadError> {
    let outer_id = value
        .get("id")
        .and_then(Value::as_u64)
        .or_else(|| value.pointer("/asset/id").and_then(Value::as_u64));
    let nested = value.get("data").filter(|d| d.get("post_url").is_some()).cloned();
    let mut signed: SignedUpload = decode(nested.unwrap_or(value), "signed upload")?;
    signed.id = signed.id.or(outer_id);
    Ok(signed)
}

fn entry_body(draft: &EntryDraft, publish: bool) -> Value {
    let mut body = json!({ "story": draft });
    if publish {
        body["publish"] = json!(1);
    }
    body
}

fn folder_body(name: &str, slug: &str, parent_id: u64) -> Value {
    json!({
        "story": {
            "name": name,
            "slug": slug,
            "is_folder": true,
            "parent_id": parent_id,
            "content": { "component": "folder" },
        }
    })
}

impl ContentBackend for StoryblokClient {
    #[instrument(level = "info", skip_all)]
    async fn list_folders(&self) -> Result<Vec<Folder>, UploadError> {
        let mut folders = Vec::new();
        for page in 1u32.. {
            let query = [
                ("folder_only", "1".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let list: FolderList = decode(self.call(Method::GET, "/stories", &query, None).await?, "folder list")?;
            let count = list.stories.len();
            folders.extend(list.stories);
            if count < PER_PAGE {
                break;
            }
        }
        debug!(count = folders.len(), "Listed folders");
        Ok(folders)
    }

    #[instrument(level = "info", skip_all, fields(%name, parent_id))]
    async fn create_folder(&self, name: &str, slug: &str, parent_id: u64) -> Result<Folder, UploadError> {
        let body = folder_body(name, slug, parent_id);
        let created: StoryEnvelope<Folder> =
            decode(self.call(Method::POST, "/stories", &[], Some(&body)).await?, "created folder")?;
        Ok(created.story)
    }

    #[instrument(level = "info", skip_all, fields(%full_slug))]
    async fn find_entry(&self, full_slug: &str) -> Result<Option<EntryRef>, UploadError> {
        let query = [("with_slug", full_slug.to_string())];
        let list: EntryList = decode(self.call(Method::GET, "/stories", &query, None).await?, "entry lookup")?;
        Ok(list.stories.into_iter().find(|e| e.full_slug.is_empty() || e.full_slug == full_slug))
    }

    #[instrument(level = "info", skip_all, fields(slug = %draft.slug, publish))]
    async fn create_entry(&self, draft: &EntryDraft, publish: bool) -> Result<EntryRef, UploadError> {
        let body = entry_body(draft, publish);
        let created: StoryEnvelope<EntryRef> =
            decode(self.call(Method::POST, "/stories", &[], Some(&body)).await?, "created entry")?;
        Ok(created.story)
    }

    #[instrument(level = "info", skip_all, fields(id, publish))]
    async fn update_entry(&self, id: u64, draft: &EntryDraft, publish: bool) -> Result<EntryRef, UploadError> {
        let body = entry_body(draft, publish);
        let path = format!("/stories/{id}");
        let updated: StoryEnvelope<EntryRef> =
            decode(self.call(Method::PUT, &path, &[], Some(&body)).await?, "updated entry")?;
        Ok(updated.story)
    }

    #[instrument(level = "info", skip_all, fields(filename = %asset.filename, bytes = asset.bytes.len()))]
    async fn upload_asset(&self, asset: AssetUpload) -> Result<AssetRef, UploadError> {
        let mut body = json!({ "filename": asset.filename });
        if let Some(folder_id) = asset.folder_id {
            body["asset_folder_id"] = json!(folder_id);
        }
        let signed = parse_signed_upload(self.call(Method::POST, "/assets", &[], Some(&body)).await?)?;
        let key = signed.key()?;

        self.post_signed(&signed, &asset).await?;
        Ok(AssetRef::new(signed.id, self.public_asset_url(&key)))
    }

    fn editor_url(&self, entry_id: u64) -> Option<String> {
        Some(format!("{EDITOR_BASE}/{}/stories/0/0/{entry_id}", self.space_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> StoryblokClient {
        let credentials = Credentials {
            token: "secret-token".to_string(),
            space_id: 4242,
        };
        let config = StoryblokConfig {
            api_base: "https://mapi.example.test/v1/".to_string(),
            ..StoryblokConfig::default()
        };
        StoryblokClient::new(&config, &credentials).unwrap()
    }

    fn draft() -> EntryDraft {
        let mut content = Map::new();
        content.insert("component".to_string(), json!("success_story"));
        EntryDraft {
            name: "Hope".to_string(),
            slug: "hope".to_string(),
            parent_id: 12,
            content,
        }
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(client.space_url("/stories"), "https://mapi.example.test/v1/spaces/4242/stories");
        assert_eq!(
            client.public_asset_url("f/4242/1x1/abc/hero.jpg"),
            "https://a.storyblok.com/f/4242/1x1/abc/hero.jpg"
        );
        assert_eq!(
            client.editor_url(99).unwrap(),
            "https://app.storyblok.com/#/me/spaces/4242/stories/0/0/99"
        );
    }

    #[test]
    fn test_invalid_token_is_rejected_up_front() {
        let credentials = Credentials {
            token: "bad\ntoken".to_string(),
            space_id: 1,
        };
        assert!(matches!(
            StoryblokClient::new(&StoryblokConfig::default(), &credentials),
            Err(UploadError::Client(_))
        ));
    }

    #[test]
    fn test_parse_body_classifies_statuses() {
        let url = "https://mapi.example.test/v1/spaces/1/stories";
        assert_eq!(parse_body(url, 200, r#"{"stories":[]}"#).unwrap(), json!({"stories": []}));
        assert_eq!(parse_body(url, 204, "").unwrap(), Value::Null);
        assert!(matches!(parse_body(url, 401, "Unauthorized"), Err(UploadError::Unauthorized { status: 401 })));
        assert!(matches!(parse_body(url, 422, "{\"slug\":[\"taken\"]}"), Err(UploadError::Rejected { .. })));
        assert!(matches!(parse_body(url, 503, ""), Err(UploadError::Api { status: 503, .. })));
        assert!(matches!(parse_body(url, 200, "<html>"), Err(UploadError::Schema(_))));
    }

    #[test]
    fn test_entry_body_publish_flag() {
        let draft_body = entry_body(&draft(), false);
        assert_eq!(draft_body["story"]["slug"], "hope");
        assert_eq!(draft_body["story"]["parent_id"], 12);
        assert_eq!(draft_body["story"]["content"]["component"], "success_story");
        assert!(draft_body.get("publish").is_none());

        assert_eq!(entry_body(&draft(), true)["publish"], 1);
    }

    #[test]
    fn test_folder_body() {
        let body = folder_body("Automation", "automation", 0);
        assert_eq!(body["story"]["is_folder"], true);
        assert_eq!(body["story"]["parent_id"], 0);
        assert_eq!(body["story"]["slug"], "automation");
    }

    #[test]
    fn test_parse_signed_upload_shapes() {
        let flat = json!({
            "id": 77,
            "post_url": "https://s3.example.test/upload",
            "fields": {"key": "f/1/hero.jpg", "policy": "abc", "x-amz-date": 20240101}
        });
        let signed = parse_signed_upload(flat).unwrap();
        assert_eq!(signed.id, Some(77));
        assert_eq!(signed.key().unwrap(), "f/1/hero.jpg");
        assert_eq!(field_text(&signed.fields["x-amz-date"]), "20240101");

        let nested = json!({
            "asset": {"id": 78},
            "data": {"post_url": "https://s3.example.test/upload", "fields": {"key": "f/1/b.png"}}
        });
        let signed = parse_signed_upload(nested).unwrap();
        assert_eq!(signed.id, Some(78));
        assert_eq!(signed.key().unwrap(), "f/1/b.png");

        let keyless = json!({"post_url": "https://s3.example.test/upload", "fields": {}});
        assert!(matches!(parse_signed_upload(keyless).unwrap().key(), Err(UploadError::Schema(_))));
        assert!(matches!(parse_signed_upload(json!({"id": 1})), Err(UploadError::Schema(_))));
    }

    #[test]
    fn test_story_lists_decode() {
        let folders: FolderList = decode(
            json!({"stories": [
                {"id": 1, "name": "Automation", "slug": "automation", "full_slug": "automation", "parent_id": null, "is_folder": true},
                {"id": 2, "name": "success-stories", "slug": "success-stories", "full_slug": "automation/success-stories", "parent_id": 1}
            ]}),
            "folders",
        )
        .unwrap();
        assert_eq!(folders.stories.len(), 2);
        assert_eq!(folders.stories[0].parent(), 0);
        assert_eq!(folders.stories[1].parent(), 1);

        let entries: EntryList = decode(json!({}), "entries").unwrap();
        assert!(entries.stories.is_empty());
    }
}
