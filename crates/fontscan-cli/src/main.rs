//! FontScan CLI - Command-line interface for website font analysis

use clap::{Parser, ValueEnum};
use fontscan::{
    render_all, report_schema, write_report, FontType, ReportOptions, ScanError, ScanOptions,
    Scanner,
};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Report format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable report
    #[default]
    Text,
    /// JSON document
    Json,
    /// One row per font
    Csv,
}

impl From<OutputFormat> for fontscan::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => fontscan::OutputFormat::Text,
            OutputFormat::Json => fontscan::OutputFormat::Json,
            OutputFormat::Csv => fontscan::OutputFormat::Csv,
        }
    }
}

/// Font type filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TypeFilter {
    Web,
    System,
    Custom,
    Generic,
}

impl From<TypeFilter> for FontType {
    fn from(filter: TypeFilter) -> Self {
        match filter {
            TypeFilter::Web => FontType::Web,
            TypeFilter::System => FontType::System,
            TypeFilter::Custom => FontType::Custom,
            TypeFilter::Generic => FontType::Generic,
        }
    }
}

/// FontScan - find and classify the fonts a website uses
#[derive(Parser, Debug)]
#[command(name = "fontscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// URLs to analyze (https:// is assumed when no scheme is given)
    #[arg(required_unless_present = "schema")]
    urls: Vec<String>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(long, short)]
    save: Option<PathBuf>,

    /// Show sources, selectors and analyzed CSS blocks
    #[arg(long, short)]
    verbose: bool,

    /// Per-request timeout in seconds
    #[arg(long, short, default_value_t = 30)]
    timeout: u64,

    /// Custom User-Agent
    #[arg(long, short)]
    user_agent: Option<String>,

    /// Do not fetch linked or imported stylesheets
    #[arg(long)]
    no_external: bool,

    /// Leave system fonts out of the report
    #[arg(long)]
    no_system: bool,

    /// Seconds to wait before each stylesheet request
    #[arg(long, default_value = "1.0", value_parser = parse_delay)]
    delay: Duration,

    /// Only report fonts of this type
    #[arg(long, short, value_enum)]
    filter: Option<TypeFilter>,

    /// Disable colored text output
    #[arg(long)]
    no_colors: bool,

    /// Deepest @import chain to follow
    #[arg(long, default_value_t = 5)]
    max_import_depth: usize,

    /// Print the JSON schema of the JSON report and exit
    #[arg(long)]
    schema: bool,
}

impl Cli {
    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            timeout: Duration::from_secs(self.timeout),
            user_agent: self.user_agent.clone(),
            follow_external: !self.no_external,
            include_system: !self.no_system,
            delay: self.delay,
            max_import_depth: self.max_import_depth,
            type_filter: self.filter.map(FontType::from),
        }
    }

    fn report_options(&self, stdout_is_terminal: bool) -> ReportOptions {
        ReportOptions {
            format: self.output.into(),
            verbose: self.verbose,
            colors: !self.no_colors && self.save.is_none() && stdout_is_terminal,
            type_filter: self.filter.map(FontType::from),
        }
    }
}

fn parse_delay(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("invalid delay '{s}': expected seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("invalid delay '{s}': must be >= 0"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        if let Some(source) = std::error::Error::source(&e) {
            eprintln!("  Caused by: {}", source);
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,fontscan=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), ScanError> {
    if cli.schema {
        writeln_safe(&serde_json::to_string_pretty(&report_schema())?);
        return Ok(());
    }

    let scanner = Scanner::builder().options(cli.scan_options()).build();
    tracing::debug!(targets = cli.urls.len(), options = ?scanner.options(), "Starting scan");
    let results = scanner.analyze_all(&cli.urls).await?;
    let report = render_all(&results, &cli.report_options(io::stdout().is_terminal()))?;
    emit(&report, cli.save.as_deref())
}

/// Print the report, or save it when a path is given
fn emit(report: &str, save: Option<&Path>) -> Result<(), ScanError> {
    match save {
        Some(path) => {
            write_report(path, report)?;
            eprintln!("Report saved to {}", path.display());
        }
        None => writeln_safe(report.trim_end_matches('\n')),
    }
    Ok(())
}

/// Write to stdout, exit silently on broken pipe
fn writeln_safe(s: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", s) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}
