use clap::{Args, Subcommand, ValueEnum};
use engine_config::settings::{TransportKind, overrides::SettingsOverrides};
use engine_runtime::execution::executor::StateBackend;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape every conference listed in the input CSV
    Scrape(ScrapeArgs),
    /// Resolve the final address of every URL in a CSV column
    Resolve(ResolveArgs),
    /// Show the checkpoint of a previous run
    Progress(ProgressArgs),
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    #[arg(long, default_value = "./data/conferences_merged_full.csv")]
    pub input: PathBuf,

    #[arg(long, default_value = "./data/civilica_parallel_output.csv")]
    pub output: PathBuf,

    #[arg(long, default_value = "failed_urls.csv", help = "Failed-items report")]
    pub failed: PathBuf,

    #[arg(
        long,
        default_value = "filtered_conference_ids.csv",
        help = "Where to export the ids that passed the keyword filter"
    )]
    pub filtered: PathBuf,

    #[arg(long, help = "CSV of ids to skip, e.g. an earlier failed-items report")]
    pub exclude: Option<PathBuf>,

    #[arg(long, default_value = "id")]
    pub id_column: String,

    #[arg(long, default_value = "keywords")]
    pub keyword_column: String,

    #[arg(long, help = "Site root the listing pages live under")]
    pub base_url: Option<String>,

    #[arg(long, help = "Stop paging a conference after this many listing pages")]
    pub max_pages: Option<u32>,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = "website", help = "Column holding the URLs")]
    pub column: String,

    #[arg(long, default_value = "./data/resolved_urls.csv")]
    pub output: PathBuf,

    #[arg(long, default_value = "failed_redirects.csv")]
    pub failed: PathBuf,

    #[arg(long, help = "CSV of URLs to skip")]
    pub exclude: Option<PathBuf>,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

/// Knobs shared by every run mode. Unset flags leave the config file or defaults alone.
#[derive(Args, Debug)]
pub struct TuningArgs {
    #[arg(long, help = "Index of the first id to process")]
    pub start: Option<usize>,

    #[arg(long, help = "Index one past the last id to process")]
    pub end: Option<usize>,

    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long, help = "Per-request timeout in seconds")]
    pub timeout: Option<f64>,

    #[arg(long, help = "Retries after the first attempt")]
    pub retries: Option<u32>,

    #[arg(long, help = "Flush results after this many successes")]
    pub save_every: Option<usize>,

    #[arg(long)]
    pub min_delay: Option<f64>,

    #[arg(long)]
    pub max_delay: Option<f64>,

    #[arg(long)]
    pub headless: bool,

    #[arg(long, help = "Run a single worker")]
    pub no_parallel: bool,

    #[arg(long, help = "http or browser")]
    pub transport: Option<TransportKind>,

    #[arg(long, help = "Pause after each page load, in milliseconds")]
    pub settle_ms: Option<u64>,

    #[arg(long, help = "JSON settings file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Forget the checkpoint of this run and start over")]
    pub fresh: bool,

    #[command(flatten)]
    pub state: StateArgs,
}

#[derive(Args, Debug)]
pub struct StateArgs {
    #[arg(long, help = "Checkpoint directory (default ~/.harvest/state)")]
    pub state_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = BackendArg::Sled)]
    pub state_backend: BackendArg,
}

#[derive(Args, Debug)]
pub struct ProgressArgs {
    #[arg(long, value_enum, default_value_t = ModeArg::Scrape)]
    pub mode: ModeArg,

    #[arg(long, help = "Output file of the run to inspect")]
    pub output: PathBuf,

    #[arg(long)]
    pub start: Option<usize>,

    #[arg(long)]
    pub end: Option<usize>,

    #[arg(long, help = "Print the checkpoint as JSON")]
    pub json: bool,

    #[command(flatten)]
    pub state: StateArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    Sled,
    Json,
}

impl From<BackendArg> for StateBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Sled => StateBackend::Sled,
            BackendArg::Json => StateBackend::Json,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Scrape,
    Resolve,
}

impl ModeArg {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeArg::Scrape => "scrape",
            ModeArg::Resolve => "resolve",
        }
    }
}

impl TuningArgs {
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            workers: self.workers,
            timeout: self.timeout,
            retries: self.retries,
            save_every: self.save_every,
            min_delay: self.min_delay,
            max_delay: self.max_delay,
            start: self.start,
            end: self.end,
            headless: self.headless.then_some(true),
            no_parallel: self.no_parallel,
            settle_ms: self.settle_ms,
            transport: self.transport,
            ..Default::default()
        }
    }
}
