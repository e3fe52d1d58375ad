use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::SideloadError;
use crate::parser::read_limited_bytes;
use crate::storage::{Attachment, EventId, EventStore};

const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Downloads an image and attaches it to an event.
#[async_trait]
pub trait ImageSideloader: Send + Sync {
    async fn fetch_and_attach(
        &self,
        url: &str,
        owner: EventId,
        alt_text: &str,
    ) -> Result<(), SideloadError>;
}

/// Saves images under a media directory and records them on the event.
pub struct HttpImageSideloader {
    client: Client,
    store: Arc<dyn EventStore>,
    media_dir: PathBuf,
    timeout: Duration,
}

impl HttpImageSideloader {
    pub fn new(
        client: Client,
        store: Arc<dyn EventStore>,
        media_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            store,
            media_dir: media_dir.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ImageSideloader for HttpImageSideloader {
    async fn fetch_and_attach(
        &self,
        url: &str,
        owner: EventId,
        alt_text: &str,
    ) -> Result<(), SideloadError> {
        let parsed = Url::parse(url).map_err(|e| SideloadError::InvalidUrl(format!("{url}: {e}")))?;

        let response = self
            .client
            .get(parsed.clone())
            .timeout(self.timeout)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(SideloadError::BadStatus(response.status().as_u16()));
        }
        let bytes = read_limited_bytes(response, MAX_IMAGE_SIZE)
            .await?
            .ok_or(SideloadError::TooLarge)?;

        tokio::fs::create_dir_all(&self.media_dir).await?;
        let path = self.media_dir.join(media_file_name(owner, &parsed));
        tokio::fs::write(&path, &bytes).await?;
        debug!(url, path = %path.display(), bytes = bytes.len(), "image saved");

        self.store
            .attach_image(
                owner,
                Attachment {
                    source_url: url.to_owned(),
                    path,
                    alt_text: alt_text.to_owned(),
                },
            )
            .await?;
        Ok(())
    }
}

/// `<owner>-<last path segment>`, restricted to a safe character set.
fn media_file_name(owner: EventId, url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    let safe: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{owner}-{safe}")
}
