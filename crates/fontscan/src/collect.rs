//! Style source collection
//!
//! Fetches the page, then walks its stylesheets one request at a time:
//! linked sheets first, then `@import` targets breadth-first. Every
//! failure is recorded and collection moves on to the next resource.

use crate::classify::ClassifierTables;
use crate::css::{find_imports, looks_like_css};
use crate::error::FetchError;
use crate::fetchers::{Fetcher, ResourceKind};
use crate::html::{scan_page, PageScan};
use crate::types::{CssBlock, CssOrigin};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Options controlling how far collection reaches
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Fetch linked and imported stylesheets
    pub follow_external: bool,
    /// Pause before each stylesheet request
    pub delay: Duration,
    /// Deepest `@import` chain followed
    pub max_import_depth: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            follow_external: true,
            delay: Duration::from_secs(1),
            max_import_depth: 5,
        }
    }
}

/// Everything gathered for one page
#[derive(Debug, Default)]
pub struct PageSources {
    /// Page scan, if the page itself could be fetched
    pub page: Option<PageScan>,
    /// URL CSS in the page resolves against (final URL after redirects)
    pub base_url: Option<Url>,
    pub blocks: Vec<CssBlock>,
    /// Fetch failures, in encounter order
    pub errors: Vec<FetchError>,
}

struct Pending {
    url: Url,
    origin: CssOrigin,
    depth: usize,
}

/// Fetch a page and all of its style sources
pub async fn collect_sources(
    fetcher: &dyn Fetcher,
    page_url: &Url,
    tables: &ClassifierTables,
    options: &CollectOptions,
) -> PageSources {
    let mut sources = PageSources::default();

    let page = match fetcher.fetch(page_url, ResourceKind::Page).await {
        Ok(page) => page,
        Err(e) => {
            warn!(url = %page_url, error = %e, "Page fetch failed");
            sources.errors.push(e);
            return sources;
        }
    };
    let base_url = Url::parse(&page.url).unwrap_or_else(|_| page_url.clone());

    // DOM is dropped here, before any further await
    let scan = scan_page(&page.body, &base_url, tables);

    let mut queue = VecDeque::new();
    for css in &scan.inline_styles {
        sources.blocks.push(CssBlock::inline(css.clone()));
    }
    for url in &scan.stylesheet_links {
        queue.push_back(Pending {
            url: url.clone(),
            origin: CssOrigin::External,
            depth: 0,
        });
    }
    if options.max_import_depth > 0 {
        for css in &scan.inline_styles {
            for url in find_imports(css, &base_url) {
                queue.push_back(Pending {
                    url,
                    origin: CssOrigin::Imported,
                    depth: 1,
                });
            }
        }
    }

    if !options.follow_external && !queue.is_empty() {
        debug!(skipped = queue.len(), "External stylesheets disabled");
        queue.clear();
    }

    let mut visited: HashSet<Url> = HashSet::new();
    visited.insert(page_url.clone());
    visited.insert(base_url.clone());

    while let Some(next) = queue.pop_front() {
        if !visited.insert(next.url.clone()) {
            debug!(url = %next.url, "Already fetched, skipping");
            continue;
        }

        if !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }

        let fetched = match fetcher.fetch(&next.url, ResourceKind::Stylesheet).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(url = %next.url, error = %e, "Stylesheet fetch failed");
                sources.errors.push(e);
                continue;
            }
        };

        if !is_css(fetched.content_type.as_deref(), &fetched.body) {
            warn!(url = %next.url, "Response is not CSS");
            sources.errors.push(FetchError::NotCss {
                url: next.url.to_string(),
            });
            continue;
        }

        for url in find_imports(&fetched.body, &next.url) {
            if next.depth < options.max_import_depth {
                queue.push_back(Pending {
                    url,
                    origin: CssOrigin::Imported,
                    depth: next.depth + 1,
                });
            } else {
                warn!(url = %url, depth = next.depth + 1, "Import depth limit reached");
            }
        }

        debug!(url = %next.url, origin = %next.origin, bytes = fetched.body.len(), "Collected stylesheet");
        let block = match next.origin {
            CssOrigin::Imported => CssBlock::imported(next.url.as_str(), fetched.body),
            _ => CssBlock::external(next.url.as_str(), fetched.body),
        };
        sources.blocks.push(block);
    }

    sources.page = Some(scan);
    sources.base_url = Some(base_url);
    sources
}

fn is_css(content_type: Option<&str>, body: &str) -> bool {
    match content_type {
        Some(ct) if ct.to_lowercase().contains("text/css") => true,
        _ => looks_like_css(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetchers::MemoryFetcher;

    const CSS: Option<&str> = Some("text/css");

    fn options() -> CollectOptions {
        CollectOptions {
            delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn page_url() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[tokio::test]
    async fn test_collects_inline_external_and_imported() {
        let fetcher = MemoryFetcher::new(&[
            (
                "https://example.com/",
                Some("text/html"),
                r#"<style>@import "/extra.css"; h1 { font-family: A; }</style>
                   <link rel="stylesheet" href="/site.css">"#,
            ),
            ("https://example.com/site.css", CSS, "@import url(deep.css); p { font-family: B; }"),
            ("https://example.com/extra.css", CSS, "em { font-family: C; }"),
            ("https://example.com/deep.css", CSS, "b { font-family: D; }"),
        ]);

        let sources =
            collect_sources(&fetcher, &page_url(), &ClassifierTables::default(), &options()).await;

        assert!(sources.errors.is_empty());
        let origins: Vec<_> = sources
            .blocks
            .iter()
            .map(|b| (b.origin, b.location.as_str()))
            .collect();
        assert_eq!(
            origins,
            vec![
                (CssOrigin::Inline, ""),
                (CssOrigin::External, "https://example.com/site.css"),
                (CssOrigin::Imported, "https://example.com/extra.css"),
                (CssOrigin::Imported, "https://example.com/deep.css"),
            ]
        );
    }

    #[tokio::test]
    async fn test_page_failure_is_recorded() {
        let fetcher = MemoryFetcher::new(&[]);

        let sources =
            collect_sources(&fetcher, &page_url(), &ClassifierTables::default(), &options()).await;

        assert!(sources.page.is_none());
        assert!(sources.blocks.is_empty());
        assert_eq!(sources.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_one_failed_sheet_one_error() {
        let fetcher = MemoryFetcher::new(&[
            (
                "https://example.com/",
                None,
                r#"<link rel="stylesheet" href="/missing.css"><link rel="stylesheet" href="/ok.css">"#,
            ),
            ("https://example.com/ok.css", CSS, "p { font-family: B; }"),
        ]);

        let sources =
            collect_sources(&fetcher, &page_url(), &ClassifierTables::default(), &options()).await;

        assert_eq!(sources.errors.len(), 1);
        assert!(sources.errors[0].to_string().contains("missing.css"));
        assert_eq!(sources.blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_import_cycle_fetched_once() {
        let fetcher = MemoryFetcher::new(&[
            ("https://example.com/", None, r#"<link rel="stylesheet" href="/a.css">"#),
            ("https://example.com/a.css", CSS, "@import 'b.css';"),
            ("https://example.com/b.css", CSS, "@import 'a.css';"),
        ]);

        let sources =
            collect_sources(&fetcher, &page_url(), &ClassifierTables::default(), &options()).await;

        assert_eq!(sources.blocks.len(), 2);
        assert_eq!(
            fetcher.requests(),
            vec![
                "https://example.com/",
                "https://example.com/a.css",
                "https://example.com/b.css",
            ]
        );
    }

    #[tokio::test]
    async fn test_import_depth_limit() {
        let fetcher = MemoryFetcher::new(&[
            ("https://example.com/", None, r#"<link rel="stylesheet" href="/1.css">"#),
            ("https://example.com/1.css", CSS, "@import '2.css';"),
            ("https://example.com/2.css", CSS, "@import '3.css';"),
            ("https://example.com/3.css", CSS, "a { font-family: X; }"),
        ]);
        let options = CollectOptions {
            max_import_depth: 1,
            ..options()
        };

        let sources =
            collect_sources(&fetcher, &page_url(), &ClassifierTables::default(), &options).await;

        assert_eq!(sources.blocks.len(), 2);
        assert!(sources.errors.is_empty());
        assert!(!fetcher.requests().contains(&"https://example.com/3.css".to_string()));
    }

    #[tokio::test]
    async fn test_no_external_fetches_only_page() {
        let fetcher = MemoryFetcher::new(&[(
            "https://example.com/",
            None,
            r#"<style>@import "x.css"; a { font-family: A; }</style><link rel="stylesheet" href="/site.css">"#,
        )]);
        let options = CollectOptions {
            follow_external: false,
            ..options()
        };

        let sources =
            collect_sources(&fetcher, &page_url(), &ClassifierTables::default(), &options).await;

        assert_eq!(fetcher.requests(), vec!["https://example.com/"]);
        assert_eq!(sources.blocks.len(), 1);
        assert!(sources.errors.is_empty());
    }

    #[tokio::test]
    async fn test_non_css_body_rejected() {
        let fetcher = MemoryFetcher::new(&[
            ("https://example.com/", None, r#"<link rel="stylesheet" href="/sheet">"#),
            ("https://example.com/sheet", Some("text/plain"), "Not found, sorry"),
        ]);

        let sources =
            collect_sources(&fetcher, &page_url(), &ClassifierTables::default(), &options()).await;

        assert!(sources.blocks.is_empty());
        assert!(matches!(sources.errors[0], FetchError::NotCss { .. }));
    }

    const THREE_SHEETS: &str = r#"<link rel="stylesheet" href="/a.css">
        <link rel="stylesheet" href="/b.css">
        <link rel="stylesheet" href="/c.css">"#;

    fn three_sheet_site() -> MemoryFetcher {
        MemoryFetcher::new(&[
            ("https://example.com/", None, THREE_SHEETS),
            ("https://example.com/a.css", CSS, "a { font-family: A; }"),
            ("https://example.com/b.css", CSS, "b { font-family: B; }"),
            ("https://example.com/c.css", CSS, "i { font-family: C; }"),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_before_each_stylesheet() {
        let fetcher = three_sheet_site();
        let options = CollectOptions {
            delay: Duration::from_secs(1),
            ..Default::default()
        };

        let start = tokio::time::Instant::now();
        let sources =
            collect_sources(&fetcher, &page_url(), &ClassifierTables::default(), &options).await;
        let elapsed = start.elapsed();

        assert_eq!(sources.blocks.len(), 3);
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_delay_without_external() {
        let fetcher = three_sheet_site();
        let options = CollectOptions {
            follow_external: false,
            delay: Duration::from_secs(1),
            ..Default::default()
        };

        let start = tokio::time::Instant::now();
        let sources =
            collect_sources(&fetcher, &page_url(), &ClassifierTables::default(), &options).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(sources.blocks.is_empty());
        assert_eq!(fetcher.requests(), vec!["https://example.com/"]);
    }
}
