use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ImportSettings, Schedule};
use crate::error::ImportError;
use crate::importer::{ImportSummary, Importer};

pub type SharedSettings = Arc<RwLock<ImportSettings>>;

pub fn shared_settings(initial: ImportSettings) -> SharedSettings {
    Arc::new(RwLock::new(initial))
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Schedule::default().into()
    }
}

impl From<Schedule> for SchedulerConfig {
    fn from(schedule: Schedule) -> Self {
        Self {
            interval: schedule.interval(),
        }
    }
}

#[derive(Debug)]
pub enum Event {
    ImportFinished(ImportSummary),
    ImportFailed(String),
}

pub struct SchedulerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops future ticks and waits for a run in progress to finish.
    pub async fn stop(self) -> Result<(), ImportError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(ImportError::from)
    }
}

/// Runs an import on every tick, starting immediately.
///
/// Settings are re-read at each tick so edits apply to the next run.
pub fn spawn_scheduler(
    importer: Arc<Importer>,
    settings: SharedSettings,
    config: SchedulerConfig,
    update_tx: mpsc::Sender<Event>,
) -> SchedulerHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    info!("scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let event = run_once(&importer, &settings).await;
                    if update_tx.send(event).await.is_err() {
                        warn!("update receiver dropped");
                    }
                }
            }
        }
    });

    SchedulerHandle { cancel_tx, join }
}

/// One scheduled run, with errors flattened into a user-facing message.
pub async fn run_once(importer: &Importer, settings: &SharedSettings) -> Event {
    let snapshot = settings.read().await.clone();
    match importer.run(&snapshot).await {
        Ok(summary) => Event::ImportFinished(summary),
        Err(err) => {
            warn!(feed = %snapshot.feed_url, error = %err, "scheduled import failed");
            Event::ImportFailed(err.to_string())
        }
    }
}
