use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::{error, info, warn};

use feedkeeper::app::{App, CancelFlag};
use feedkeeper::config::{ConfigLoader, ResolvedConfig};
use feedkeeper::crawler::Crawler;
use feedkeeper::domain::Locale;
use feedkeeper::error::FeedError;
use feedkeeper::feed::FeedHttpClient;
use feedkeeper::fingerprint::FingerprintExtractor;
use feedkeeper::layout::Layout;
use feedkeeper::logging;
use feedkeeper::output::{self, JsonOutput, OutputMode};
use feedkeeper::retention::{self, RetentionPolicy};
use feedkeeper::store::FingerprintStore;
use feedkeeper::tags::ExifTagWriter;

#[derive(Parser)]
#[command(name = "feedkeeper")]
#[command(about = "Archive the daily image feed for every market, skipping duplicates")]
#[command(version, author)]
struct Cli {
    /// Directory images are saved to
    #[arg(short, long, global = true, value_name = "DIR")]
    path: Option<Utf8PathBuf>,

    /// Config file (default: feedkeeper.json when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<String>,

    /// Months after which saved images move to the archive directory (0 disables)
    #[arg(short, long, global = true, value_name = "MONTHS")]
    archive_months: Option<u32>,

    /// Market to search; repeat for several. Replaces the configured list.
    #[arg(short, long = "locale", global = true, value_name = "LOCALE")]
    locales: Vec<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Reconcile the catalog, then search every locale for new images (default)")]
    Run,
    #[command(about = "Align the fingerprint catalog with the images on disk")]
    Reconcile,
    #[command(about = "List the archive entries of one locale without downloading")]
    Crawl { locale: String },
}

enum Outcome {
    Completed,
    Cancelled,
}

fn main() -> ExitCode {
    match run() {
        Ok(Outcome::Completed) => ExitCode::SUCCESS,
        Ok(Outcome::Cancelled) => ExitCode::from(2),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<FeedError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &FeedError) -> u8 {
    if error.is_network() {
        return 3;
    }
    1
}

fn run() -> miette::Result<Outcome> {
    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if !cli.locales.is_empty() {
        config.locales = cli
            .locales
            .iter()
            .map(|value| value.parse::<Locale>())
            .collect::<Result<_, _>>()?;
    }
    if let Some(months) = cli.archive_months {
        config.archive_months = months;
    }
    if config.locales.is_empty() {
        return Err(FeedError::NoLocales.into());
    }

    let layout = match cli.path.clone().or_else(|| config.path.clone()) {
        Some(root) => Layout::new_with_root(root),
        None => Layout::new()?,
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_feed(layout, config, output_mode),
        Command::Reconcile => run_reconcile(layout, config, output_mode),
        Command::Crawl { locale } => run_crawl(locale, config, output_mode),
    }
}

fn run_feed(
    layout: Layout,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<Outcome> {
    layout.ensure()?;
    let log_path = logging::init(Some(&layout.log_dir()))?;
    info!(path = %layout.save_dir(), log = ?log_path, "saving images");

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_flag.cancel()) {
        warn!(error = %err, "unable to install Ctrl-C handler");
    }

    let client = FeedHttpClient::new(&config.host)?;
    let tags = ExifTagWriter::new(layout.tags_dir());
    let mut app = App::open(layout.clone(), &config, client, tags)?;

    let outcome = app.reconcile().and_then(|report| {
        info!(
            pruned = report.pruned,
            added = report.added,
            total = report.total,
            "fingerprint catalog reconciled"
        );
        app.run(&config.locales, &cancel)
    });
    if let Err(err) = &outcome {
        error!(error = ?err, "error processing");
    }

    info!("clearing up");
    let finished = app.finish();
    retention::sweep(
        &layout,
        RetentionPolicy {
            archive_months: config.archive_months,
            log_retention_days: config.log_retention_days,
        },
    );

    let result = outcome?;
    finished?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&result).into_diagnostic()?,
        OutputMode::Human => output::print_run_summary(&result),
    }
    Ok(if result.cancelled {
        Outcome::Cancelled
    } else {
        Outcome::Completed
    })
}

fn run_reconcile(
    layout: Layout,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<Outcome> {
    layout.ensure()?;
    logging::init(Some(&layout.log_dir()))?;

    let extractor = FingerprintExtractor::new(config.fingerprint, layout.scratch_dir());
    let mut store = FingerprintStore::load(&layout, config.fingerprint);
    let report = store.reconcile(&extractor);
    let flushed = store.flush();
    if let Err(err) = layout.clear_scratch() {
        warn!(error = %err, "error cleaning up scratch directory");
    }
    let report = report?;
    flushed?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_reconcile(&report).into_diagnostic()?,
        OutputMode::Human => output::print_reconcile_summary(&report),
    }
    Ok(Outcome::Completed)
}

fn run_crawl(
    locale: String,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<Outcome> {
    logging::init(None)?;
    let locale: Locale = locale.parse()?;
    let client = FeedHttpClient::new(&config.host)?;
    let entries = Crawler::new(&client, config.page_size, config.max_pages).crawl(&locale);

    match output_mode {
        OutputMode::Json => JsonOutput::print_entries(&entries).into_diagnostic()?,
        OutputMode::Human => output::print_entries(&entries),
    }
    Ok(Outcome::Completed)
}
