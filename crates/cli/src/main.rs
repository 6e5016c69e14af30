use crate::{
    commands::{Commands, ProgressArgs, ResolveArgs, ScrapeArgs, TuningArgs},
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use connectors::{
    client::{BrowserClientFactory, HttpClientFactory},
    extract::{Extractor, conference::ConferenceExtractor, redirect::RedirectExtractor},
    file::csv::{
        ids::{load_conference_rows, load_exclusions, load_url_column, write_filtered_ids},
        output::CsvOutputSink,
    },
    transport::browser::BrowserOptions,
};
use engine_config::settings::{ScrapeSettings, TransportKind};
use engine_core::{connectors::fetch::ClientFactory, state::StateStore};
use engine_processing::queue::IdSource;
use engine_runtime::{
    error::RunError,
    execution::{
        executor::{self, ScrapeJob, make_run_key, open_state_store},
        summary::RunSummary,
    },
};
use model::core::identifiers::ItemId;
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod commands;
mod error;
mod logging;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "harvest",
    version = "0.1.0",
    about = "Resumable concurrent scraper"
)]
struct Cli {
    #[arg(long, global = true, help = "Also write logs to this file")]
    log_file: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = match logging::init(cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(ExitCode::GeneralError.as_i32());
        }
    };

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let code = match dispatch(cli.command, &shutdown).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "harvest failed");
            ExitCode::GeneralError
        }
    };

    drop(guard);
    std::process::exit(code.as_i32());
}

async fn dispatch(
    command: Commands,
    shutdown: &ShutdownCoordinator,
) -> Result<ExitCode, CliError> {
    let summary = match command {
        Commands::Scrape(args) => scrape(args, shutdown.cancel_token()).await?,
        Commands::Resolve(args) => resolve(args, shutdown.cancel_token()).await?,
        Commands::Progress(args) => {
            show_progress(args).await?;
            return Ok(ExitCode::Success);
        }
    };

    if summary.is_cancelled() || shutdown.is_shutdown_requested() {
        Ok(ExitCode::ShutdownRequested)
    } else {
        Ok(ExitCode::Success)
    }
}

async fn scrape(args: ScrapeArgs, cancel: CancellationToken) -> Result<RunSummary, CliError> {
    let mut overrides = args.tuning.overrides();
    overrides.base_url = args.base_url.clone();
    overrides.max_pages = args.max_pages;
    let settings = ScrapeSettings::resolve(args.tuning.config.as_deref(), overrides)?;

    let rows = load_conference_rows(&args.input, &args.id_column, &args.keyword_column)?;
    write_filtered_ids(&args.filtered, &rows)?;
    info!(
        kept = rows.len(),
        filtered = %args.filtered.display(),
        "Exported ids with keywords"
    );
    let ids: Vec<ItemId> = rows.into_iter().map(|row| row.id).collect();

    let extractor = ConferenceExtractor::from_base_url(
        &settings.base_url,
        settings.max_pages,
        settings.rate_limiter(),
    )?;
    let extractor: Arc<dyn Extractor> = Arc::new(extractor);

    let job = build_job(
        "scrape",
        IdSource::List(ids),
        args.exclude.as_deref(),
        &args.output,
        &args.failed,
        &args.tuning,
        settings,
        extractor,
    )
    .await?;

    let summary = executor::run(job, cancel).await?;
    output::print_summary(&summary, &args.output, &args.failed);
    Ok(summary)
}

async fn resolve(args: ResolveArgs, cancel: CancellationToken) -> Result<RunSummary, CliError> {
    let settings =
        ScrapeSettings::resolve(args.tuning.config.as_deref(), args.tuning.overrides())?;
    let urls = load_url_column(&args.input, &args.column)?;
    let extractor: Arc<dyn Extractor> = Arc::new(RedirectExtractor::new());

    let job = build_job(
        "resolve",
        IdSource::List(urls),
        args.exclude.as_deref(),
        &args.output,
        &args.failed,
        &args.tuning,
        settings,
        extractor,
    )
    .await?;

    let summary = executor::run(job, cancel).await?;
    output::print_summary(&summary, &args.output, &args.failed);
    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
async fn build_job(
    mode: &str,
    source: IdSource,
    exclude: Option<&Path>,
    output: &Path,
    failed: &Path,
    tuning: &TuningArgs,
    settings: ScrapeSettings,
    extractor: Arc<dyn Extractor>,
) -> Result<ScrapeJob, CliError> {
    let exclusions = match exclude {
        Some(path) => load_exclusions(path)?,
        None => Vec::new(),
    };

    let run_key = make_run_key(mode, output, settings.start, settings.end);
    let store = open_state_store(
        tuning.state.state_backend.into(),
        tuning.state.state_dir.as_deref(),
    )
    .await?;
    if tuning.fresh {
        store
            .clear_checkpoint(&run_key)
            .await
            .map_err(RunError::from)?;
        info!(run_key = %run_key, "Cleared checkpoint, starting over");
    }
    let sink = CsvOutputSink::open(output, failed, extractor.schema().clone())?;
    let clients = client_factory(&settings, extractor);

    info!(
        run_key = %run_key,
        mode,
        transport = %settings.transport,
        excluded = exclusions.len(),
        "Prepared job"
    );

    Ok(ScrapeJob {
        run_key,
        source,
        exclusions,
        settings,
        clients,
        output: Box::new(sink),
        state: store,
    })
}

fn client_factory(
    settings: &ScrapeSettings,
    extractor: Arc<dyn Extractor>,
) -> Arc<dyn ClientFactory> {
    match settings.transport {
        TransportKind::Http => Arc::new(HttpClientFactory::new(extractor, settings.timeout())),
        TransportKind::Browser => Arc::new(BrowserClientFactory::new(
            extractor,
            BrowserOptions {
                headless: settings.headless,
                timeout: settings.timeout(),
                settle: settings.settle(),
                ..BrowserOptions::default()
            },
        )),
    }
}

async fn show_progress(args: ProgressArgs) -> Result<(), CliError> {
    let run_key = make_run_key(args.mode.as_str(), &args.output, args.start, args.end);
    let store: Arc<dyn StateStore> =
        open_state_store(args.state.state_backend.into(), args.state.state_dir.as_deref()).await?;
    let checkpoint = store
        .load_checkpoint(&run_key)
        .await
        .map_err(RunError::from)?;

    output::print_checkpoint(&run_key, checkpoint.as_ref(), args.json)
}
