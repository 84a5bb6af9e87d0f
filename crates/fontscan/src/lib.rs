//! FontScan - website font detection library
//!
//! Fetches a page and its stylesheets, finds every font the page declares
//! or loads, classifies each one as a web, system, custom or generic font,
//! and renders the findings as text, JSON or CSV.
//!
//! ## Pipeline
//!
//! 1. [`collect`] - fetch the page, inline `<style>` blocks, linked
//!    stylesheets and `@import` targets through a [`Fetcher`]
//! 2. [`css`] and [`html`] - extract raw [`FontRule`]s
//! 3. [`classify`] - merge rules by name and classify them against
//!    [`ClassifierTables`]
//! 4. [`report`] - render an [`AnalysisResult`]
//!
//! ```no_run
//! # async fn run() -> Result<(), fontscan::ScanError> {
//! let scanner = fontscan::Scanner::builder().follow_external(false).build();
//! let result = scanner.analyze("example.com").await?;
//! println!("{} fonts", result.statistics.total_fonts);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod collect;
pub mod css;
mod error;
pub mod fetchers;
pub mod html;
pub mod report;
mod scanner;
mod types;

pub use classify::{Classifier, ClassifierTables, ProviderPattern, ServiceKind};
pub use error::{FetchError, ParseError, ScanError};
pub use fetchers::{Fetcher, HttpFetcher};
pub use report::{render, render_all, report_schema, write_report, OutputFormat, ReportOptions};
pub use scanner::{analyze, parse_target, ScanOptions, Scanner, ScannerBuilder};
pub use types::{
    AnalysisResult, BlockInfo, CssBlock, CssOrigin, Font, FontRule, FontType, RuleKind, Statistics,
};

/// Default User-Agent string
pub const DEFAULT_USER_AGENT: &str = "FontScan/1.0 (+https://github.com/everruns/fontscan)";
