//! HTTP fetcher
//!
//! Performs GET requests with reqwest, applying the configured timeout and
//! User-Agent to every request.

use crate::error::FetchError;
use crate::fetchers::{FetchedText, Fetcher, ResourceKind};
use crate::DEFAULT_USER_AGENT;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const PAGE_ACCEPT: &str = "text/html, application/xhtml+xml, */*;q=0.8";
const STYLESHEET_ACCEPT: &str = "text/css, */*;q=0.1";

/// reqwest-backed fetcher
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-request timeout and User-Agent
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        let user_agent = user_agent.unwrap_or(DEFAULT_USER_AGENT);
        let value = HeaderValue::from_str(user_agent)
            .map_err(|_| FetchError::InvalidUserAgent(user_agent.to_string()))?;
        headers.insert(USER_AGENT, value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout)
            .build()
            .map_err(FetchError::ClientBuildError)?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, url: &Url, kind: ResourceKind) -> Result<FetchedText, FetchError> {
        let accept = match kind {
            ResourceKind::Page => PAGE_ACCEPT,
            ResourceKind::Stylesheet => STYLESHEET_ACCEPT,
        };

        let request = self
            .client
            .get(url.as_str())
            .header(ACCEPT, HeaderValue::from_static(accept));

        // The timeout covers the response head and the body together
        let deadline = tokio::time::Instant::now() + self.timeout;

        let response = match tokio::time::timeout_at(deadline, request.send()).await {
            Ok(result) => result.map_err(|e| FetchError::from_reqwest(url.as_str(), e))?,
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                })
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = read_body_until(response, deadline, url).await?;
        debug!(url = %url, bytes = body.len(), "Fetched");

        Ok(FetchedText {
            url: final_url,
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// Read the whole response body before the deadline
///
/// A body that is still streaming at the deadline is a timeout; a body
/// that breaks off is a request error. Partial content is never returned.
async fn read_body_until(
    response: reqwest::Response,
    deadline: tokio::time::Instant,
    url: &Url,
) -> Result<Bytes, FetchError> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();

    loop {
        let chunk_future = stream.next();
        let timeout_future = tokio::time::sleep_until(deadline);

        tokio::select! {
            chunk = chunk_future => {
                match chunk {
                    Some(Ok(bytes)) => {
                        body.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        warn!(url = %url, bytes = body.len(), "Error reading body chunk: {}", e);
                        return Err(FetchError::RequestError {
                            url: url.to_string(),
                            message: e.to_string(),
                        });
                    }
                    None => {
                        return Ok(Bytes::from(body));
                    }
                }
            }
            _ = timeout_future => {
                warn!(url = %url, bytes = body.len(), "Body timeout reached");
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                });
            }
        }
    }
}
