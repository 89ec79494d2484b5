//! Configuration loading for the scraper and the Storyblok uploader.
//!
//! Settings come from three places, loaded once in `main` and passed down
//! explicitly:
//!
//! - an optional YAML file (`--config` or `success_stories.yaml`)
//! - Storyblok credentials from the CLI or the `STORYBLOK_*` environment
//! - a `.env` file in the working directory, consulted only for credentials
//!   the CLI and environment left unset
//!
//! Every YAML key is optional; missing keys fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "success_stories.yaml";

pub const TOKEN_VAR: &str = "STORYBLOK_TOKEN";
pub const SPACE_ID_VAR: &str = "STORYBLOK_SPACE_ID";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing {0}; set it in the environment or a .env file")]
    MissingCredential(&'static str),
    #[error("invalid STORYBLOK_SPACE_ID {0:?} (must be an integer)")]
    InvalidSpaceId(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub storyblok: StoryblokConfig,
}

/// Settings for fetching pages and images from the stories site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub page_timeout_secs: u64,
    pub image_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_timeout_secs: 60,
            image_timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}

/// Destination schema and transport settings for the Storyblok space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryblokConfig {
    pub api_base: String,
    /// Host that serves uploaded assets; the signed upload key is appended.
    pub asset_base: String,
    /// Content type (component name) of created entries.
    pub content_type: String,
    /// Folder segments under the space root, outermost first.
    pub folder_path: Vec<String>,
    pub fields: FieldMapping,
    /// Download remote hero images and upload them as assets instead of
    /// linking the remote URL directly.
    pub rehost_remote_images: bool,
    pub request_timeout_secs: u64,
    /// Total attempts per management API call, including the first.
    pub max_attempts: usize,
}

impl Default for StoryblokConfig {
    fn default() -> Self {
        Self {
            api_base: "https://mapi.storyblok.com/v1".to_string(),
            asset_base: "https://a.storyblok.com".to_string(),
            content_type: "success_story".to_string(),
            folder_path: vec!["Automation".to_string(), "success-stories".to_string()],
            fields: FieldMapping::default(),
            rehost_remote_images: false,
            request_timeout_secs: 90,
            max_attempts: 4,
        }
    }
}

impl StoryblokConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Names of the content-type fields that story data is written to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub title: String,
    pub description: String,
    pub image: String,
    /// Separate body field. When unset the body is appended to the description.
    pub body: Option<String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            title: "title".to_string(),
            description: "description".to_string(),
            image: "image".to_string(),
            body: None,
        }
    }
}

/// Management API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub space_id: u64,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("space_id", &self.space_id)
            .finish()
    }
}

impl Credentials {
    /// Validate token and space id. Flag or environment values (as clap
    /// resolved them) win over `.env` values.
    pub fn resolve(token: Option<&str>, space_id: Option<&str>, dotenv: &DotEnv) -> Result<Self, ConfigError> {
        let pick = |given: Option<&str>, key: &'static str| {
            given
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .or_else(|| dotenv.get(key).map(str::trim).filter(|v| !v.is_empty()))
                .map(str::to_string)
                .ok_or(ConfigError::MissingCredential(key))
        };
        let token = pick(token, TOKEN_VAR)?;
        let raw_space = pick(space_id, SPACE_ID_VAR)?;
        let space_id = raw_space
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidSpaceId(raw_space.clone()))?;
        Ok(Self { token, space_id })
    }
}

impl Config {
    /// Load configuration from an explicit path, or from
    /// [`DEFAULT_CONFIG_FILE`] when it exists, or fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    Self::load_from(local)
                } else {
                    debug!("No config file found; using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific YAML file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}

/// Parse one `KEY=VALUE` line of a `.env` file.
///
/// Blank lines, comments and lines without `=` yield `None`. Surrounding
/// single or double quotes are removed from the value.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim().trim_matches('"').trim_matches('\'');
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// Read `KEY=VALUE` pairs from a `.env` file. A missing file yields nothing.
pub fn read_env_file(path: &Path) -> Vec<(String, String)> {
    match std::fs::read_to_string(path) {
        Ok(content) => content.lines().filter_map(parse_env_line).collect(),
        Err(_) => Vec::new(),
    }
}

/// Values from the working directory's `.env` file.
///
/// Never exported into the process environment; lookups that also accept
/// a flag or a real environment variable fall back to it last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DotEnv {
    vars: HashMap<String, String>,
}

impl DotEnv {
    /// Read `./.env`. A missing file gives an empty set.
    pub fn load() -> Self {
        Self::from_file(Path::new(".env"))
    }

    pub fn from_file(path: &Path) -> Self {
        let vars: HashMap<_, _> = read_env_file(path).into_iter().collect();
        if !vars.is_empty() {
            debug!(path = %path.display(), count = vars.len(), "Loaded .env values");
        }
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}
