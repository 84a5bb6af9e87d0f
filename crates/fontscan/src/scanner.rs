//! Pipeline entry points
//!
//! [`Scanner`] ties the stages together: collect style sources, extract
//! font rules, classify, filter and count. Fetch and parse failures end up
//! in [`AnalysisResult::errors`]; only an unusable target is an `Err`.

use crate::classify::{Classifier, ClassifierTables};
use crate::collect::{collect_sources, CollectOptions};
use crate::css::{extract_inline_style, extract_rules};
use crate::error::ScanError;
use crate::fetchers::{Fetcher, HttpFetcher};
use crate::types::{AnalysisResult, FontType};
use reqwest::header::HeaderValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Options for one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// User-Agent header; `None` uses [`DEFAULT_USER_AGENT`](crate::DEFAULT_USER_AGENT)
    pub user_agent: Option<String>,
    /// Fetch linked and imported stylesheets
    pub follow_external: bool,
    /// Keep system fonts in the result
    pub include_system: bool,
    /// Pause before each stylesheet request
    pub delay: Duration,
    /// Deepest `@import` chain followed
    pub max_import_depth: usize,
    /// Keep only fonts of this type
    pub type_filter: Option<FontType>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            follow_external: true,
            include_system: true,
            delay: Duration::from_secs(1),
            max_import_depth: 5,
            type_filter: None,
        }
    }
}

impl ScanOptions {
    fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            follow_external: self.follow_external,
            delay: self.delay,
            max_import_depth: self.max_import_depth,
        }
    }
}

/// Builder for configuring a [`Scanner`]
#[derive(Clone, Default)]
pub struct ScannerBuilder {
    options: ScanOptions,
    tables: Option<ClassifierTables>,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl ScannerBuilder {
    /// Create a builder with default options and tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all options at once
    pub fn options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Set per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Set custom User-Agent
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.options.user_agent = Some(ua.into());
        self
    }

    /// Fetch linked and imported stylesheets
    pub fn follow_external(mut self, follow: bool) -> Self {
        self.options.follow_external = follow;
        self
    }

    /// Keep system fonts in the result
    pub fn include_system(mut self, include: bool) -> Self {
        self.options.include_system = include;
        self
    }

    /// Set pause before each stylesheet request
    pub fn delay(mut self, delay: Duration) -> Self {
        self.options.delay = delay;
        self
    }

    /// Set deepest `@import` chain followed
    pub fn max_import_depth(mut self, depth: usize) -> Self {
        self.options.max_import_depth = depth;
        self
    }

    /// Keep only fonts of one type
    pub fn type_filter(mut self, font_type: FontType) -> Self {
        self.options.type_filter = Some(font_type);
        self
    }

    /// Use custom classification tables
    pub fn tables(mut self, tables: ClassifierTables) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Use a custom fetcher instead of HTTP
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Build the scanner
    pub fn build(self) -> Scanner {
        Scanner {
            options: self.options,
            tables: self.tables.unwrap_or_default(),
            fetcher: self.fetcher,
        }
    }
}

/// Configured font scanner
#[derive(Clone)]
pub struct Scanner {
    options: ScanOptions,
    tables: ClassifierTables,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl Default for Scanner {
    fn default() -> Self {
        ScannerBuilder::new().build()
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("options", &self.options)
            .field("fetcher", &self.fetcher.as_ref().map(|f| f.name()))
            .finish_non_exhaustive()
    }
}

impl Scanner {
    /// Create a new scanner builder
    pub fn builder() -> ScannerBuilder {
        ScannerBuilder::new()
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn tables(&self) -> &ClassifierTables {
        &self.tables
    }

    /// Analyze one target
    ///
    /// The target and options are validated before anything is fetched.
    pub async fn analyze(&self, target: &str) -> Result<AnalysisResult, ScanError> {
        self.check_options()?;
        let url = parse_target(target)?;
        Ok(self.analyze_url(&url).await)
    }

    /// Analyze several targets one after another
    ///
    /// All targets are validated up front; one bad target fails the whole
    /// call before any request is made.
    pub async fn analyze_all<S: AsRef<str>>(
        &self,
        targets: &[S],
    ) -> Result<Vec<AnalysisResult>, ScanError> {
        self.check_options()?;
        let urls = targets
            .iter()
            .map(|t| parse_target(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut results = Vec::with_capacity(urls.len());
        for url in &urls {
            results.push(self.analyze_url(url).await);
        }
        Ok(results)
    }

    /// Analyze an already validated URL
    pub async fn analyze_url(&self, url: &Url) -> AnalysisResult {
        info!(url = %url, "Analyzing");
        let mut result = AnalysisResult::new(url.as_str());

        let fetcher: Arc<dyn Fetcher> = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => match HttpFetcher::new(self.options.timeout, self.options.user_agent.as_deref())
            {
                Ok(fetcher) => Arc::new(fetcher),
                Err(e) => {
                    warn!(error = %e, "Could not create HTTP client");
                    result.add_error(e);
                    result.update_statistics();
                    return result;
                }
            },
        };

        let sources = collect_sources(
            fetcher.as_ref(),
            url,
            &self.tables,
            &self.options.collect_options(),
        )
        .await;

        for error in &sources.errors {
            result.add_error(error);
        }

        let base = sources.base_url.as_ref().unwrap_or(url);
        let mut rules = Vec::new();
        for block in &sources.blocks {
            let findings = extract_rules(block, base);
            for error in findings.errors {
                warn!(error = %error, "CSS parse error");
                result.add_error(error);
            }
            debug!(origin = %block.describe(), rules = findings.rules.len(), "Extracted rules");
            rules.extend(findings.rules);
            result.css_blocks.push(block.info());
        }

        if let Some(page) = sources.page {
            for style in &page.style_attributes {
                rules.extend(extract_inline_style(style));
            }
            rules.extend(page.service_rules);
        }

        result.fonts = Classifier::new(&self.tables).classify(rules);
        self.apply_filters(&mut result);
        result.update_statistics();

        info!(
            url = %url,
            fonts = result.statistics.total_fonts,
            errors = result.errors.len(),
            "Analysis complete"
        );
        result
    }

    /// Reject options no request could be made with
    fn check_options(&self) -> Result<(), ScanError> {
        if let Some(ua) = &self.options.user_agent {
            HeaderValue::from_str(ua)
                .map_err(|_| ScanError::InvalidInput(format!("invalid user agent {ua:?}")))?;
        }
        Ok(())
    }

    fn apply_filters(&self, result: &mut AnalysisResult) {
        if !self.options.include_system {
            result
                .fonts
                .retain(|_, font| font.font_type != FontType::System);
        }
        if let Some(wanted) = self.options.type_filter {
            result.fonts.retain(|_, font| font.font_type == wanted);
        }
    }
}

/// Analyze one target with the given options
pub async fn analyze(target: &str, options: &ScanOptions) -> Result<AnalysisResult, ScanError> {
    Scanner::builder()
        .options(options.clone())
        .build()
        .analyze(target)
        .await
}

/// Validate a target and turn it into an absolute http(s) URL
///
/// A target without a scheme is treated as `https://`.
pub fn parse_target(target: &str) -> Result<Url, ScanError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ScanError::InvalidInput("empty URL".to_string()));
    }

    let candidate = if target.contains("://") {
        target.to_string()
    } else {
        format!("https://{target}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| ScanError::InvalidInput(format!("{target}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScanError::InvalidInput(format!(
            "{target}: only http and https URLs are supported"
        )));
    }
    if url.host_str().unwrap_or_default().is_empty() {
        return Err(ScanError::InvalidInput(format!("{target}: missing host")));
    }

    Ok(url)
}
