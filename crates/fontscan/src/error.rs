//! Error types for FontScan
//!
//! Fetch and parse failures are recoverable: they are recorded on the
//! [`AnalysisResult`](crate::AnalysisResult) and the run continues.
//! [`ScanError`] is the only error that ends a run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while fetching the page or one of its stylesheets
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL could not be parsed or has an unsupported scheme
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configured User-Agent is not a valid header value
    #[error("Invalid User-Agent: {0:?}")]
    InvalidUserAgent(String),

    /// Failed to build HTTP client
    #[error("Failed to create HTTP client")]
    ClientBuildError(#[source] reqwest::Error),

    /// Request exceeded the configured timeout
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    /// Failed to connect to server
    #[error("Failed to connect to {url}")]
    ConnectError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// Response did not look like a stylesheet
    #[error("Not a stylesheet: {url}")]
    NotCss { url: String },

    /// Other request error
    #[error("Request failed for {url}: {message}")]
    RequestError { url: String, message: String },
}

impl FetchError {
    /// Create an error from a reqwest error
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            FetchError::ConnectError {
                url: url.to_string(),
                source: err,
            }
        } else {
            FetchError::RequestError {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Malformed CSS fragments; the fragment is skipped and scanning continues
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Rule or declaration the CSS parser could not read
    ///
    /// `line` is 1-based; `0` when the parser gave no location.
    #[error("Invalid CSS in {origin} at {line}:{column}: {message}")]
    Syntax {
        origin: String,
        line: u32,
        column: u32,
        message: String,
    },

    /// `@font-face` without a `font-family` descriptor
    #[error("@font-face without font-family in {origin}")]
    MissingFamily { origin: String },
}

/// Fatal errors that abort a run
#[derive(Debug, Error)]
pub enum ScanError {
    /// Target URL rejected before any fetch
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Report could not be written to the requested path
    #[error("Failed to write report to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Report could not be serialized
    #[error("Failed to serialize report")]
    Serialize(#[from] serde_json::Error),
}
