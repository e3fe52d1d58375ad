//! Reconciles normalized feed events against the event store.
//!
//! Each record is looked up by its source GUID: unknown records are created,
//! known ones are updated (or skipped when updates are disabled). Store
//! failures are logged and counted per record; only feed-level problems abort
//! the whole run.

use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::ImportSettings;
use crate::error::{ImportError, StoreError};
use crate::feed::NormalizedEvent;
use crate::log::ImportLog;
use crate::parser::fetch_and_parse;
use crate::sideload::ImageSideloader;
use crate::storage::{EventFields, EventId, EventStore, IMAGE_URL_KEY};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Records the store refused to create or update.
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    #[serde(flatten)]
    pub counts: ImportCounts,
    pub log: ImportLog,
}

enum Outcome {
    Created,
    Updated,
    Skipped,
}

pub struct Importer {
    client: Client,
    store: Arc<dyn EventStore>,
    sideloader: Arc<dyn ImageSideloader>,
    run_lock: Mutex<()>,
}

impl Importer {
    pub fn new(
        client: Client,
        store: Arc<dyn EventStore>,
        sideloader: Arc<dyn ImageSideloader>,
    ) -> Self {
        Self {
            client,
            store,
            sideloader,
            run_lock: Mutex::new(()),
        }
    }

    /// Fetches the configured feed and reconciles every item.
    ///
    /// Returns [`ImportError::AlreadyRunning`] if another run holds the lock.
    pub async fn run(&self, settings: &ImportSettings) -> Result<ImportSummary, ImportError> {
        let feed_url = settings.feed_url.trim();
        if feed_url.is_empty() {
            return Err(ImportError::NoFeedUrl);
        }
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| ImportError::AlreadyRunning)?;

        let mut log = ImportLog::new();
        let events = fetch_and_parse(
            &self.client,
            feed_url,
            settings.request_timeout(),
            settings.timezone,
            &mut log,
        )
        .await?;

        let counts = self.reconcile(events, settings, &mut log).await;
        log.info(format!(
            "import finished: {} created, {} updated, {} skipped, {} failed",
            counts.created, counts.updated, counts.skipped, counts.failed
        ));
        Ok(ImportSummary { counts, log })
    }

    /// Fetches and parses the feed without touching the store.
    pub async fn preview(
        &self,
        settings: &ImportSettings,
    ) -> Result<(Vec<NormalizedEvent>, ImportLog), ImportError> {
        let feed_url = settings.feed_url.trim();
        if feed_url.is_empty() {
            return Err(ImportError::NoFeedUrl);
        }
        let mut log = ImportLog::new();
        let events = fetch_and_parse(
            &self.client,
            feed_url,
            settings.request_timeout(),
            settings.timezone,
            &mut log,
        )
        .await?;
        Ok((events, log))
    }

    /// Upserts `events` in order.
    pub async fn reconcile(
        &self,
        events: Vec<NormalizedEvent>,
        settings: &ImportSettings,
        log: &mut ImportLog,
    ) -> ImportCounts {
        let mut counts = ImportCounts::default();
        for event in &events {
            match self.reconcile_one(event, settings, log).await {
                Ok(Outcome::Created) => counts.created += 1,
                Ok(Outcome::Updated) => counts.updated += 1,
                Ok(Outcome::Skipped) => counts.skipped += 1,
                Err(e) => {
                    log.error(format!("failed to import \"{}\" ({}): {e}", event.title, event.guid));
                    counts.failed += 1;
                }
            }
        }
        counts
    }

    async fn reconcile_one(
        &self,
        event: &NormalizedEvent,
        settings: &ImportSettings,
        log: &mut ImportLog,
    ) -> Result<Outcome, StoreError> {
        let fields = event_fields(event, settings);

        match self.store.find_by_external_id(&event.guid).await? {
            Some(id) if !settings.update_existing => {
                self.refresh_image(id, event, log).await?;
                Ok(Outcome::Skipped)
            }
            Some(id) => {
                self.store.update(id, fields).await?;
                self.refresh_image(id, event, log).await?;
                log.info(format!("updated \"{}\" (event {id})", event.title));
                Ok(Outcome::Updated)
            }
            None => {
                let id = self.store.create(&event.guid, fields).await?;
                if !event.image_url.is_empty() {
                    self.attach_image(id, event, log).await?;
                }
                log.info(format!("created \"{}\" (event {id})", event.title));
                Ok(Outcome::Created)
            }
        }
    }

    /// Attaches the item's image unless the same URL was already attached.
    async fn refresh_image(
        &self,
        id: EventId,
        event: &NormalizedEvent,
        log: &mut ImportLog,
    ) -> Result<(), StoreError> {
        if event.image_url.is_empty() {
            return Ok(());
        }
        let previous = self.store.get_attribute(id, IMAGE_URL_KEY).await?;
        if previous.as_deref() == Some(event.image_url.as_str()) {
            return Ok(());
        }
        self.attach_image(id, event, log).await
    }

    /// Sideloads the image and remembers its URL. A failed download is only
    /// logged; the URL is left unrecorded so the next run tries again.
    async fn attach_image(
        &self,
        id: EventId,
        event: &NormalizedEvent,
        log: &mut ImportLog,
    ) -> Result<(), StoreError> {
        match self
            .sideloader
            .fetch_and_attach(&event.image_url, id, &event.title)
            .await
        {
            Ok(()) => {
                self.store
                    .set_attribute(id, IMAGE_URL_KEY, &event.image_url)
                    .await
            }
            Err(e) => {
                log.warn(format!(
                    "could not attach image {} to event {id}: {e}",
                    event.image_url
                ));
                Ok(())
            }
        }
    }
}

fn event_fields(event: &NormalizedEvent, settings: &ImportSettings) -> EventFields {
    let end = event.dates().end_or_default(settings.duration_hours);
    EventFields {
        title: event.title.clone(),
        body: event.body.clone(),
        link: event.link.clone(),
        status: settings.default_status,
        start: event.start.fixed_offset(),
        end: end.fixed_offset(),
    }
}
