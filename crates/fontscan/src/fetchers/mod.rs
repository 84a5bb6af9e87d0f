//! Fetcher system for retrieving pages and stylesheets
//!
//! Design: the pipeline only needs "GET this URL as text". [`Fetcher`] is
//! the seam between the collector and the network, so tests can serve
//! pages from memory and callers can plug in their own transport.

mod http;
#[cfg(test)]
mod memory;

pub use http::HttpFetcher;
#[cfg(test)]
pub(crate) use memory::MemoryFetcher;

use crate::error::FetchError;
use async_trait::async_trait;
use url::Url;

/// What a request is for; decides the Accept header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// The target HTML document
    Page,
    /// A stylesheet (linked or imported)
    Stylesheet,
}

/// Textual body of a successful fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedText {
    /// Final URL after redirects
    pub url: String,
    /// Content-Type header value
    pub content_type: Option<String>,
    /// Decoded body
    pub body: String,
}

/// Trait for retrieving textual resources
///
/// Implementations return an error for transport failures, timeouts,
/// incomplete bodies and non-success HTTP statuses.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Unique identifier for this fetcher (for logging/debugging)
    fn name(&self) -> &'static str;

    /// Fetch the resource at `url`
    async fn fetch(&self, url: &Url, kind: ResourceKind) -> Result<FetchedText, FetchError>;
}
