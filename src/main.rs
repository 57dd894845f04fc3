use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use skimmer::data_io::{default_output_path, detect_data_format};
use skimmer::runtime::{RunnerOptions, run_headless};
use skimmer::{DataFormat, EngineTuning, ReplayDriver, ScrapeConfig, ScrapeMode};

#[derive(Debug, Parser)]
#[command(
    name = "skimmer",
    version,
    about = "Timeline harvester over captured feed snapshots with CSV/JSON output"
)]
struct Cli {
    /// Captured snapshot files, in scroll order.
    #[arg(value_name = "SNAPSHOT", required = true, num_args = 1..)]
    snapshots: Vec<PathBuf>,

    #[arg(short, long, value_name = "FILE")]
    output: Option<String>,

    #[arg(long, value_enum, default_value_t = FileFormatArg::Csv)]
    format: FileFormatArg,

    #[arg(long, value_enum, default_value_t = ModeArg::All)]
    mode: ModeArg,

    /// Collection cap; required with --mode count.
    #[arg(long, value_name = "N")]
    max_items: Option<usize>,

    /// Window start (YYYY-MM-DD); required with --mode range.
    #[arg(long, value_name = "DATE")]
    since: Option<NaiveDate>,

    /// Window end (YYYY-MM-DD); required with --mode range.
    #[arg(long, value_name = "DATE")]
    until: Option<NaiveDate>,

    /// Origin the snapshots were captured from; resolves relative links.
    #[arg(long, value_name = "URL", default_value = "https://x.com")]
    base_url: String,

    /// Settle delay between replayed scroll steps.
    #[arg(long, value_name = "MS", default_value_t = 25)]
    scroll_settle_ms: u64,

    /// Settle delay after show-more expansion.
    #[arg(long, value_name = "MS", default_value_t = 0)]
    expand_settle_ms: u64,

    #[arg(long, default_value_t = false)]
    quiet: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
enum FileFormatArg {
    Csv,
    Json,
}

impl From<FileFormatArg> for DataFormat {
    fn from(value: FileFormatArg) -> Self {
        match value {
            FileFormatArg::Csv => DataFormat::Csv,
            FileFormatArg::Json => DataFormat::Json,
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
enum ModeArg {
    All,
    Count,
    Range,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mode = match cli.mode {
        ModeArg::All => ScrapeMode::All,
        ModeArg::Count => ScrapeMode::Count {
            max_items: cli
                .max_items
                .context("--max-items is required with --mode count")?,
        },
        ModeArg::Range => ScrapeMode::DateRange {
            start: cli.since.context("--since is required with --mode range")?,
            end: cli.until.context("--until is required with --mode range")?,
        },
    };
    let config = ScrapeConfig::new(mode);
    config.validate()?;

    let configured_format: DataFormat = cli.format.into();
    let format = cli
        .output
        .as_deref()
        .map(|path| detect_data_format(path, configured_format))
        .unwrap_or(configured_format);
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.base_url, format));

    let driver = ReplayDriver::from_files(&cli.snapshots, cli.base_url.clone())
        .context("failed to load snapshot files")?;

    let tuning = EngineTuning {
        scroll_settle: Duration::from_millis(cli.scroll_settle_ms),
        expand_settle: Duration::from_millis(cli.expand_settle_ms),
        ..EngineTuning::default()
    };

    run_headless(
        driver,
        RunnerOptions {
            config,
            output_path,
            format,
            tuning,
            quiet: cli.quiet,
        },
    )
    .await?;

    Ok(())
}
