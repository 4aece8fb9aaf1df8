use anyhow::{Context as AnyhowContext, Result};
use archive_pipeline::{
    BatchRunner, DeletedAuthors, RecordTransform, SizeBuckets, StripNewlines, TokenCorpus,
    FIRST_YEAR,
};
use clap::{Args, Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod report;

pub use config::{ConfigError, RawSettings, RunConfig};

/// Exit status for failures after validation succeeded.
const EXIT_RUNTIME_FAILURE: i32 = 5;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "archive-scan")]
#[command(about = "Scan monthly comment archives with a bounded pool of readers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    data: DataArgs,

    /// Print the summary as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Root of bzip2 archives laid out as YEAR/RC_YEAR-MM.bz2
    #[arg(long, global = true)]
    zipped: Option<PathBuf>,

    /// Root of uncompressed archives laid out as YEAR/RC_YEAR-MM
    #[arg(long, global = true)]
    unzipped: Option<PathBuf>,

    /// Single data root (see --compressed)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Treat --data as a root of bzip2 archives
    #[arg(long, global = true)]
    compressed: bool,

    /// Root for rewritten archives (strip, tokens)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Number of simultaneous readers (default: ARCHIVE_SCAN_READERS or CPU count)
    #[arg(long, global = true)]
    readers: Option<usize>,

    /// First year to process (2007 <= start <= last <= 2015)
    #[arg(long, global = true, default_value_t = FIRST_YEAR)]
    start: i32,

    /// Last year to process (2007 <= start <= last <= 2015)
    #[arg(long, global = true, default_value_t = FIRST_YEAR)]
    last: i32,
}

impl From<DataArgs> for RawSettings {
    fn from(args: DataArgs) -> Self {
        RawSettings {
            zipped: args.zipped,
            unzipped: args.unzipped,
            data: args.data,
            compressed: args.compressed,
            output: args.output,
            readers: args.readers,
            start: args.start,
            last: args.last,
        }
    }
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Count comments per body-size bucket
    Sizes,

    /// Count comments whose author was deleted
    Deleted,

    /// Rewrite archives with newlines removed from every body
    Strip,

    /// Write lowercase alphanumeric token lines for embedding training
    Tokens,
}

impl Commands {
    fn transform(self) -> Arc<dyn RecordTransform> {
        match self {
            Commands::Sizes => Arc::new(SizeBuckets),
            Commands::Deleted => Arc::new(DeletedAuthors),
            Commands::Strip => Arc::new(StripNewlines),
            Commands::Tokens => Arc::new(TokenCorpus),
        }
    }
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();
    if cli.json {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let transform = cli.command.transform();
    let config = match RunConfig::validate(
        cli.data.into(),
        transform.name(),
        transform.writes_output(),
    ) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            std::process::exit(err.exit_code());
        }
    };

    if let Err(err) = run(config, transform, cli.json).await {
        log::error!("{err:#}");
        std::process::exit(EXIT_RUNTIME_FAILURE);
    }
    Ok(())
}

async fn run(config: RunConfig, transform: Arc<dyn RecordTransform>, json: bool) -> Result<()> {
    log::info!(
        "Processing date range {} to {}",
        config.catalog.start(),
        config.catalog.last()
    );
    log::info!(
        "Searching for zipped files in: {}",
        display_root(config.resolver.zipped_root())
    );
    log::info!(
        "Searching for unzipped files in: {}",
        display_root(config.resolver.unzipped_root())
    );
    log::info!("Number of readers: {}", config.batch.readers);

    let mut runner = BatchRunner::new(config.batch, Arc::new(config.resolver), transform);
    if let Some(output) = config.output {
        runner = runner.with_output(output);
    }
    let summary = runner
        .run(config.catalog.tasks())
        .await
        .context("Batch run failed")?;

    if json {
        print_stdout(&serde_json::to_string_pretty(&summary)?)?;
    } else {
        print_stdout(&report::render_summary(&summary))?;
    }
    Ok(())
}

fn display_root(root: Option<&std::path::Path>) -> String {
    root.map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}
