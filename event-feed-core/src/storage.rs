use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::PostStatus;
use crate::dates::DateParts;
use crate::error::StoreError;

pub type EventId = u64;

/// Attribute holding the GUID of the feed item an event was imported from.
pub const SOURCE_GUID_KEY: &str = "_source_guid";
/// Attribute holding the image URL attached on the last import.
pub const IMAGE_URL_KEY: &str = "_image_url";

/// The fields an import writes on every create or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFields {
    pub title: String,
    pub body: String,
    pub link: String,
    pub status: PostStatus,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl EventFields {
    pub fn start_parts(&self) -> DateParts {
        DateParts::from(&self.start)
    }

    pub fn end_parts(&self) -> DateParts {
        DateParts::from(&self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub source_url: String,
    pub path: PathBuf,
    pub alt_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEvent {
    pub id: EventId,
    pub fields: EventFields,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub image: Option<Attachment>,
}

/// Destination of imported events.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn find_by_external_id(&self, guid: &str) -> Result<Option<EventId>, StoreError>;
    /// Creates an event tagged with the feed item's GUID in a single write, so
    /// a created event is always findable by `find_by_external_id`.
    async fn create(&self, guid: &str, fields: EventFields) -> Result<EventId, StoreError>;
    async fn update(&self, id: EventId, fields: EventFields) -> Result<(), StoreError>;
    async fn get_attribute(&self, id: EventId, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_attribute(&self, id: EventId, key: &str, value: &str) -> Result<(), StoreError>;
    async fn attach_image(&self, id: EventId, attachment: Attachment) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct EventData {
    next_id: EventId,
    events: BTreeMap<EventId, PersistedEvent>,
}

/// Event store kept in memory and, when opened from a path, mirrored to a JSON
/// file after every write.
#[derive(Debug, Clone)]
pub struct JsonEventStore {
    inner: Arc<RwLock<EventData>>,
    path: Option<PathBuf>,
}

impl JsonEventStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(EventData::default())),
            path: None,
        }
    }

    /// Opens the store at `path`. A corrupted file falls back to the temp file
    /// left by an interrupted write, then to an empty store.
    pub async fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<EventData>(&bytes) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "failed to parse event store, trying tmp fallback");
                    let tmp = path.with_extension("json.tmp");
                    match tokio::fs::read(&tmp).await {
                        Ok(tmp_bytes) => serde_json::from_slice(&tmp_bytes).unwrap_or_default(),
                        Err(_) => EventData::default(),
                    }
                }
            },
            Err(_) => EventData::default(),
        };
        Self {
            inner: Arc::new(RwLock::new(data)),
            path: Some(path),
        }
    }

    /// All events ordered by id.
    pub async fn events(&self) -> Vec<PersistedEvent> {
        self.inner.read().await.events.values().cloned().collect()
    }

    pub async fn get(&self, id: EventId) -> Option<PersistedEvent> {
        self.inner.read().await.events.get(&id).cloned()
    }

    async fn persist(&self, data: &EventData) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            debug!("event store is in-memory only; skipping persist");
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(data)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Applies `change` to one event and persists. The in-memory copy is only
    /// replaced once the write succeeded.
    async fn modify<F>(&self, id: EventId, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut PersistedEvent) + Send,
    {
        let mut inner = self.inner.write().await;
        let mut next = inner.clone();
        let event = next.events.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        change(event);
        self.persist(&next).await?;
        *inner = next;
        Ok(())
    }
}

#[async_trait]
impl EventStore for JsonEventStore {
    async fn find_by_external_id(&self, guid: &str) -> Result<Option<EventId>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .values()
            .find(|e| e.attributes.get(SOURCE_GUID_KEY).map(String::as_str) == Some(guid))
            .map(|e| e.id))
    }

    async fn create(&self, guid: &str, fields: EventFields) -> Result<EventId, StoreError> {
        let mut inner = self.inner.write().await;
        let mut next = inner.clone();
        next.next_id += 1;
        let id = next.next_id;
        next.events.insert(
            id,
            PersistedEvent {
                id,
                fields,
                attributes: BTreeMap::from([(SOURCE_GUID_KEY.to_owned(), guid.to_owned())]),
                image: None,
            },
        );
        self.persist(&next).await?;
        *inner = next;
        Ok(id)
    }

    async fn update(&self, id: EventId, fields: EventFields) -> Result<(), StoreError> {
        self.modify(id, |event| event.fields = fields).await
    }

    async fn get_attribute(&self, id: EventId, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.read().await;
        let event = inner.events.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(event.attributes.get(key).cloned())
    }

    async fn set_attribute(&self, id: EventId, key: &str, value: &str) -> Result<(), StoreError> {
        let (key, value) = (key.to_owned(), value.to_owned());
        self.modify(id, |event| {
            event.attributes.insert(key, value);
        })
        .await
    }

    async fn attach_image(&self, id: EventId, attachment: Attachment) -> Result<(), StoreError> {
        self.modify(id, |event| event.image = Some(attachment)).await
    }
}
