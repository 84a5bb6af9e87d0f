//! Report rendering
//!
//! Three encodings of an [`AnalysisResult`]: human-readable text, JSON and
//! CSV. Rendering is pure and deterministic; [`write_report`] is the only
//! I/O.

use crate::error::ScanError;
use crate::types::{AnalysisResult, BlockInfo, Font, FontType, Statistics};
use schemars::{schema_for, JsonSchema};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;

/// Width of the rule under the text report header
const RULE_WIDTH: usize = 50;

/// Selectors listed per font in verbose text output
const MAX_SELECTORS: usize = 3;

/// CSV columns, in order
const CSV_HEADER: [&str; 8] = [
    "name",
    "type",
    "provider",
    "weights",
    "styles",
    "format",
    "source",
    "selector_count",
];

/// Output encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err("Invalid output format: must be text, json or csv".to_string()),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Options for rendering a report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOptions {
    pub format: OutputFormat,
    /// Include sources, selectors and the CSS block list in text output
    pub verbose: bool,
    /// ANSI colors in text output
    pub colors: bool,
    /// Show only this group in text output
    pub type_filter: Option<FontType>,
}

/// JSON report document
#[derive(Debug, Serialize, JsonSchema)]
pub struct JsonReport<'a> {
    pub url: &'a str,
    pub fonts: Vec<&'a Font>,
    pub statistics: &'a Statistics,
    pub css_blocks: &'a [BlockInfo],
    pub errors: &'a [String],
}

impl<'a> From<&'a AnalysisResult> for JsonReport<'a> {
    fn from(result: &'a AnalysisResult) -> Self {
        Self {
            url: &result.url,
            fonts: result.fonts.values().collect(),
            statistics: &result.statistics,
            css_blocks: &result.css_blocks,
            errors: &result.errors,
        }
    }
}

/// JSON schema of the JSON report
pub fn report_schema() -> serde_json::Value {
    let schema = schema_for!(JsonReport<'static>);
    serde_json::to_value(schema).unwrap_or_default()
}

/// Render one result
pub fn render(result: &AnalysisResult, options: &ReportOptions) -> Result<String, ScanError> {
    match options.format {
        OutputFormat::Text => Ok(render_text(result, options)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonReport::from(result))?),
        OutputFormat::Csv => Ok(render_csv(result)),
    }
}

/// Render several results as one document
///
/// JSON becomes an array of reports; text and CSV reports are
/// concatenated.
pub fn render_all(results: &[AnalysisResult], options: &ReportOptions) -> Result<String, ScanError> {
    match (results, options.format) {
        ([single], _) => render(single, options),
        (_, OutputFormat::Json) => {
            let reports: Vec<JsonReport> = results.iter().map(JsonReport::from).collect();
            Ok(serde_json::to_string_pretty(&reports)?)
        }
        _ => {
            let rendered = results
                .iter()
                .map(|result| render(result, options))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rendered.join("\n"))
        }
    }
}

/// Write rendered output to a file, creating or truncating it
pub fn write_report(path: impl AsRef<Path>, content: &str) -> Result<(), ScanError> {
    let path = path.as_ref();
    std::fs::write(path, content).map_err(|source| ScanError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// ANSI styling, or nothing
struct Painter {
    enabled: bool,
}

impl Painter {
    const BOLD: &'static str = "1";
    const RED: &'static str = "31";
    const GREEN: &'static str = "32";
    const YELLOW: &'static str = "33";
    const BLUE: &'static str = "34";
    const MAGENTA: &'static str = "35";
    const CYAN: &'static str = "36";

    fn paint(&self, text: &str, code: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str, color: &str) -> String {
        self.paint(text, &format!("{};{color}", Self::BOLD))
    }
}

fn group_title(font_type: FontType) -> (&'static str, &'static str) {
    match font_type {
        FontType::Web => ("Web Fonts", Painter::BLUE),
        FontType::System => ("System Fonts", Painter::YELLOW),
        FontType::Custom => ("Custom Fonts", Painter::MAGENTA),
        FontType::Generic => ("Generic Families", Painter::CYAN),
    }
}

fn render_text(result: &AnalysisResult, options: &ReportOptions) -> String {
    let painter = Painter {
        enabled: options.colors,
    };
    let mut lines = vec![
        painter.heading(&format!("Font Analysis Results for {}", result.url), Painter::CYAN),
        "=".repeat(RULE_WIDTH),
        String::new(),
    ];

    if result.fonts.is_empty() {
        lines.push("No fonts found.".to_string());
        lines.push(String::new());
    }

    for font_type in FontType::ALL {
        if options.type_filter.is_some_and(|wanted| wanted != font_type) {
            continue;
        }
        let fonts: Vec<&Font> = result.fonts_of(font_type).collect();
        if fonts.is_empty() {
            continue;
        }
        let (title, color) = group_title(font_type);
        lines.push(painter.heading(&format!("{title} ({}):", fonts.len()), color));
        for font in fonts {
            font_lines(&mut lines, font, options.verbose, &painter);
        }
        lines.push(String::new());
    }

    let stats = &result.statistics;
    lines.push(painter.heading("Summary:", Painter::GREEN));
    lines.push(format!("  Total fonts: {}", stats.total_fonts));
    lines.push(format!("  Web fonts: {}", stats.web_fonts));
    lines.push(format!("  System fonts: {}", stats.system_fonts));
    lines.push(format!("  Custom fonts: {}", stats.custom_fonts));
    lines.push(format!("  Generic families: {}", stats.generic_fonts));
    lines.push(format!("  CSS blocks analyzed: {}", stats.css_blocks));
    for (provider, count) in &stats.providers {
        lines.push(format!("  {provider}: {count}"));
    }
    lines.push(String::new());

    if options.verbose && !result.css_blocks.is_empty() {
        lines.push(painter.heading("CSS Blocks Analyzed:", Painter::GREEN));
        for block in &result.css_blocks {
            match &block.location {
                Some(location) => lines.push(format!("  - {} {location}", block.origin)),
                None => lines.push(format!("  - {}", block.origin)),
            }
        }
        lines.push(String::new());
    }

    if !result.errors.is_empty() {
        lines.push(painter.heading(
            &format!("Warnings ({}):", result.errors.len()),
            Painter::RED,
        ));
        for error in &result.errors {
            lines.push(painter.paint(&format!("  ⚠ {error}"), Painter::RED));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn font_lines(lines: &mut Vec<String>, font: &Font, verbose: bool, painter: &Painter) {
    let mut title = format!(
        "  {} {}",
        painter.paint("✓", Painter::GREEN),
        painter.paint(&font.name, Painter::BOLD)
    );
    if let Some(provider) = &font.provider {
        title.push_str(&painter.paint(&format!(" ({provider})"), Painter::CYAN));
    }
    lines.push(title);

    if !font.weights.is_empty() {
        lines.push(format!("    Weights: {}", join(&font.weights, ", ")));
    }
    if !font.styles.is_empty() {
        lines.push(format!("    Styles: {}", join(&font.styles, ", ")));
    }
    if let Some(format) = &font.format {
        lines.push(format!("    Format: {format}"));
    }
    if !verbose {
        return;
    }
    if let Some(source) = &font.source {
        lines.push(format!("    Source: {source}"));
    }
    if !font.selectors.is_empty() {
        let shown: Vec<&str> = font
            .selectors
            .iter()
            .take(MAX_SELECTORS)
            .map(String::as_str)
            .collect();
        let mut used_in = shown.join(", ");
        if font.selectors.len() > MAX_SELECTORS {
            used_in.push_str(&format!(" (and {} more)", font.selectors.len() - MAX_SELECTORS));
        }
        lines.push(format!("    Used in: {used_in}"));
    }
    if let Some(range) = &font.unicode_range {
        lines.push(format!("    Unicode range: {range}"));
    }
}

fn join<'a>(values: impl IntoIterator<Item = &'a String>, sep: &str) -> String {
    values
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(sep)
}

fn render_csv(result: &AnalysisResult) -> String {
    let mut out = csv_row(CSV_HEADER.iter().map(|h| h.to_string()));
    for font in result.fonts.values() {
        out.push_str(&csv_row([
            font.name.clone(),
            font.font_type.to_string(),
            font.provider.clone().unwrap_or_default(),
            join(&font.weights, ";"),
            join(&font.styles, ";"),
            font.format.clone().unwrap_or_default(),
            font.source.clone().unwrap_or_default(),
            font.selectors.len().to_string(),
        ]));
    }
    out
}

fn csv_row(cells: impl IntoIterator<Item = String>) -> String {
    let mut row = cells
        .into_iter()
        .map(|cell| {
            if needs_quotes(&cell) {
                format!("\"{}\"", cell.replace('"', "\"\""))
            } else {
                cell
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    row.push('\n');
    row
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}
