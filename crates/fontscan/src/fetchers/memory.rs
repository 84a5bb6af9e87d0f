//! In-memory fetcher for unit tests

use super::{FetchedText, Fetcher, ResourceKind};
use crate::error::FetchError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

/// Serves canned bodies keyed by URL and records every request
///
/// Unknown URLs answer with HTTP 404.
pub(crate) struct MemoryFetcher {
    pages: HashMap<String, (Option<&'static str>, &'static str)>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    /// Build from `(url, content type, body)` triples
    pub(crate) fn new(pages: &[(&str, Option<&'static str>, &'static str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, content_type, body)| (url.to_string(), (*content_type, *body)))
                .collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// URLs requested so far, in order
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, url: &Url, _kind: ResourceKind) -> Result<FetchedText, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.pages.get(url.as_str()) {
            Some((content_type, body)) => Ok(FetchedText {
                url: url.to_string(),
                content_type: content_type.map(str::to_string),
                body: body.to_string(),
            }),
            None => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
