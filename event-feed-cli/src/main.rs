mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use event_feed_core::{
    shared_settings, spawn_scheduler, Event, HttpImageSideloader, ImportSettings, Importer,
    JsonEventStore, PostStatus, Schedule, SchedulerConfig,
};
use reqwest::{redirect, Client, ClientBuilder};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "event-feed",
    version,
    about = "Import events from a The Events Calendar RSS feed"
)]
struct Args {
    /// Settings file (defaults to <config dir>/event-feed/settings.json)
    #[arg(long, value_name = "FILE", global = true)]
    settings: Option<PathBuf>,

    /// Directory holding the event store and downloaded images
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Use this feed URL instead of the configured one
    #[arg(long, value_name = "URL", global = true)]
    feed_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one import now
    Run,
    /// Fetch and parse the feed without importing anything
    Preview,
    /// Import on the configured schedule until interrupted
    Watch,
    /// List imported events
    List,
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    Set(SetArgs),
}

#[derive(ClapArgs, Debug)]
struct SetArgs {
    #[arg(long)]
    feed_url: Option<String>,
    /// Default event length in hours when the feed gives no end date
    #[arg(long)]
    duration: Option<u32>,
    #[arg(long, value_enum)]
    status: Option<StatusArg>,
    #[arg(long)]
    update_existing: Option<bool>,
    #[arg(long, value_enum)]
    schedule: Option<ScheduleArg>,
    /// IANA timezone name, e.g. Europe/Paris
    #[arg(long)]
    timezone: Option<String>,
    /// HTTP timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatusArg {
    Publish,
    Draft,
}

impl From<StatusArg> for PostStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Publish => PostStatus::Publish,
            StatusArg::Draft => PostStatus::Draft,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ScheduleArg {
    Hourly,
    Twicedaily,
    Daily,
}

impl From<ScheduleArg> for Schedule {
    fn from(arg: ScheduleArg) -> Self {
        match arg {
            ScheduleArg::Hourly => Schedule::Hourly,
            ScheduleArg::Twicedaily => Schedule::TwiceDaily,
            ScheduleArg::Daily => Schedule::Daily,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let settings_path = match &args.settings {
        Some(path) => path.clone(),
        None => ImportSettings::default_path()?,
    };
    let mut settings = ImportSettings::load_from(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    if let Some(url) = &args.feed_url {
        settings.feed_url = url.clone();
    }
    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);

    match args.command {
        Command::Config { action } => configure(action, settings, &settings_path, args.json),
        Command::List => {
            let store = JsonEventStore::load_from(data_dir.join("events.json")).await;
            output::print_events(&store.events().await, args.json)
        }
        Command::Preview => {
            let (importer, _) = build_importer(&settings, &data_dir).await?;
            let (events, _log) = importer
                .preview(&settings)
                .await
                .context("could not read the feed")?;
            output::print_preview(&events, args.json)
        }
        Command::Run => {
            let (importer, _) = build_importer(&settings, &data_dir).await?;
            let summary = importer.run(&settings).await.context("import failed")?;
            output::print_summary(&summary, args.json)
        }
        Command::Watch => watch(settings, &data_dir, args.json).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_data_dir() -> PathBuf {
    // Linux: ~/.local/share/event-feed
    let mut dir = dirs::data_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default();
    dir.push("event-feed");
    dir
}

fn build_client(settings: &ImportSettings) -> Result<Client> {
    ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent(settings.user_agent.clone())
        .build()
        .context("failed to build HTTP client")
}

async fn build_importer(
    settings: &ImportSettings,
    data_dir: &std::path::Path,
) -> Result<(Arc<Importer>, Arc<JsonEventStore>)> {
    let client = build_client(settings)?;
    let store = Arc::new(JsonEventStore::load_from(data_dir.join("events.json")).await);
    let sideloader = Arc::new(HttpImageSideloader::new(
        client.clone(),
        store.clone(),
        data_dir.join("media"),
        settings.request_timeout(),
    ));
    let importer = Arc::new(Importer::new(client, store.clone(), sideloader));
    Ok((importer, store))
}

async fn watch(settings: ImportSettings, data_dir: &std::path::Path, json: bool) -> Result<()> {
    let (importer, _) = build_importer(&settings, data_dir).await?;
    let config = SchedulerConfig::from(settings.schedule);
    info!(interval_secs = config.interval.as_secs(), feed = %settings.feed_url, "starting scheduler");

    let (update_tx, mut update_rx) = mpsc::channel(8);
    let handle = spawn_scheduler(importer, shared_settings(settings), config, update_tx);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, waiting for the current import to finish");
                break;
            }
            event = update_rx.recv() => match event {
                Some(Event::ImportFinished(summary)) => output::print_summary(&summary, json)?,
                Some(Event::ImportFailed(message)) => eprintln!("import failed: {message}"),
                None => break,
            }
        }
    }

    handle.stop().await.context("scheduler stopped abnormally")
}

fn configure(
    action: ConfigAction,
    mut settings: ImportSettings,
    path: &std::path::Path,
    json: bool,
) -> Result<()> {
    match action {
        ConfigAction::Show => output::print_settings(&settings, json),
        ConfigAction::Set(set) => {
            if let Some(url) = set.feed_url {
                settings.feed_url = url;
            }
            if let Some(hours) = set.duration {
                settings.duration_hours = hours;
            }
            if let Some(status) = set.status {
                settings.default_status = status.into();
            }
            if let Some(update) = set.update_existing {
                settings.update_existing = update;
            }
            if let Some(schedule) = set.schedule {
                settings.schedule = schedule.into();
            }
            if let Some(tz) = set.timezone {
                settings.set_timezone(&tz)?;
            }
            if let Some(secs) = set.timeout {
                settings.request_timeout_seconds = secs;
            }
            settings
                .save_to(path)
                .with_context(|| format!("failed to save settings to {}", path.display()))?;
            output::print_settings(&settings, json)
        }
    }
}
