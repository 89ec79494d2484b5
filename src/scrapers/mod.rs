//! Fetching and parsing of success-story pages.
//!
//! Scraping a story happens in three steps, each in its own submodule:
//!
//! 1. **Fetching** ([`http`]): download the page HTML (and later the hero
//!    image bytes) with a browser-like client
//! 2. **Extraction** ([`extract`]): pull title, date, description, body and
//!    hero image out of the page's content container
//! 3. **Image download** ([`images`]): save the hero image next to the JSON
//!    output, falling back to the remote URL on failure
//!
//! Network access goes through the [`PageSource`] trait so the orchestrator
//! and the image downloader can run against an in-memory double in tests.

pub mod extract;
pub mod http;
pub mod images;

pub use http::FetchError;

/// Raw bytes of a fetched resource plus the declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBytes {
    pub bytes: Vec<u8>,
    /// Lowercased `Content-Type` header, without parameters.
    pub content_type: Option<String>,
}

/// Trait for retrieving pages and binary resources by URL.
///
/// Implementors perform exactly one request per call; failures are reported
/// as [`FetchError`] and never retried here.
pub trait PageSource {
    /// Fetch a page and return its decoded HTML.
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch a binary resource such as an image.
    async fn fetch_bytes(&self, url: &str) -> Result<FetchedBytes, FetchError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`PageSource`] used across the crate's tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct StubSource {
        pages: HashMap<String, String>,
        resources: HashMap<String, FetchedBytes>,
        pub requests: RefCell<Vec<String>>,
    }

    impl StubSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        pub fn with_resource(mut self, url: &str, bytes: &[u8], content_type: Option<&str>) -> Self {
            self.resources.insert(
                url.to_string(),
                FetchedBytes {
                    bytes: bytes.to_vec(),
                    content_type: content_type.map(str::to_string),
                },
            );
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl PageSource for StubSource {
        async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
            self.requests.borrow_mut().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }

        async fn fetch_bytes(&self, url: &str) -> Result<FetchedBytes, FetchError> {
            self.requests.borrow_mut().push(url.to_string());
            self.resources.get(url).cloned().ok_or_else(|| FetchError::Timeout {
                url: url.to_string(),
            })
        }
    }
}
