#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use event_feed_core::{
    Attachment, EventFields, EventId, EventStore, ImageSideloader, Importer, JsonEventStore,
    SideloadError, StoreError,
};
use reqwest::Client;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct TestItem<'a> {
    pub guid: &'a str,
    pub title: &'a str,
    pub pub_date: &'a str,
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
    pub description: &'a str,
}

impl<'a> TestItem<'a> {
    pub fn new(guid: &'a str, title: &'a str) -> Self {
        Self {
            guid,
            title,
            pub_date: "Mon, 21 Oct 2024 07:00:00 +0000",
            start: None,
            end: None,
            description: "<p>Details</p>",
        }
    }
}

pub fn feed_xml(items: &[TestItem]) -> String {
    let mut body = String::new();
    for item in items {
        body.push_str("<item>");
        body.push_str(&format!("<title>{}</title>", item.title));
        body.push_str(&format!(
            "<link>https://source.example/event/{}/</link>",
            item.guid
        ));
        body.push_str(&format!(
            "<guid isPermaLink=\"false\">{}</guid>",
            item.guid
        ));
        body.push_str(&format!("<pubDate>{}</pubDate>", item.pub_date));
        if let Some(start) = item.start {
            body.push_str(&format!("<ev:startdate>{start}</ev:startdate>"));
        }
        if let Some(end) = item.end {
            body.push_str(&format!("<ev:enddate>{end}</ev:enddate>"));
        }
        body.push_str(&format!(
            "<description><![CDATA[{}]]></description>",
            item.description
        ));
        body.push_str("</item>\n");
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:ev="http://purl.org/rss/2.0/modules/event/">
<channel>
<title>Source Events</title>
<link>https://source.example/</link>
<description>Upcoming events</description>
{body}</channel>
</rss>"#
    )
}

pub async fn mount_feed(server: &MockServer, xml: String) {
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(xml),
        )
        .mount(server)
        .await;
}

/// Records every sideload request instead of downloading anything.
#[derive(Default)]
pub struct RecordingSideloader {
    pub calls: Mutex<Vec<(String, EventId)>>,
}

impl RecordingSideloader {
    pub fn urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }
}

#[async_trait]
impl ImageSideloader for RecordingSideloader {
    async fn fetch_and_attach(
        &self,
        url: &str,
        owner: EventId,
        _alt_text: &str,
    ) -> Result<(), SideloadError> {
        self.calls.lock().unwrap().push((url.to_owned(), owner));
        Ok(())
    }
}

/// Answers the first `failures` requests with a 503, then succeeds.
pub struct FlakySideloader {
    pub failures: usize,
    pub attempts: AtomicUsize,
}

impl FlakySideloader {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSideloader for FlakySideloader {
    async fn fetch_and_attach(
        &self,
        _url: &str,
        _owner: EventId,
        _alt_text: &str,
    ) -> Result<(), SideloadError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(SideloadError::BadStatus(503));
        }
        Ok(())
    }
}

/// In-memory store whose first attribute write fails.
pub struct FailFirstAttributeStore {
    pub inner: JsonEventStore,
    pub failed: AtomicUsize,
}

impl FailFirstAttributeStore {
    pub fn new() -> Self {
        Self {
            inner: JsonEventStore::in_memory(),
            failed: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EventStore for FailFirstAttributeStore {
    async fn find_by_external_id(&self, guid: &str) -> Result<Option<EventId>, StoreError> {
        self.inner.find_by_external_id(guid).await
    }

    async fn create(&self, guid: &str, fields: EventFields) -> Result<EventId, StoreError> {
        self.inner.create(guid, fields).await
    }

    async fn update(&self, id: EventId, fields: EventFields) -> Result<(), StoreError> {
        self.inner.update(id, fields).await
    }

    async fn get_attribute(&self, id: EventId, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_attribute(id, key).await
    }

    async fn set_attribute(&self, id: EventId, key: &str, value: &str) -> Result<(), StoreError> {
        if self.failed.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(StoreError::Rejected(format!("attribute {key}")));
        }
        self.inner.set_attribute(id, key, value).await
    }

    async fn attach_image(&self, id: EventId, attachment: Attachment) -> Result<(), StoreError> {
        self.inner.attach_image(id, attachment).await
    }
}

/// Delegates to an in-memory store but rejects events with a given title.
pub struct RejectingStore {
    pub inner: JsonEventStore,
    pub reject_title: String,
}

#[async_trait]
impl EventStore for RejectingStore {
    async fn find_by_external_id(&self, guid: &str) -> Result<Option<EventId>, StoreError> {
        self.inner.find_by_external_id(guid).await
    }

    async fn create(&self, guid: &str, fields: EventFields) -> Result<EventId, StoreError> {
        if fields.title == self.reject_title {
            return Err(StoreError::Rejected(format!("title {}", fields.title)));
        }
        self.inner.create(guid, fields).await
    }

    async fn update(&self, id: EventId, fields: EventFields) -> Result<(), StoreError> {
        if fields.title == self.reject_title {
            return Err(StoreError::Rejected(format!("title {}", fields.title)));
        }
        self.inner.update(id, fields).await
    }

    async fn get_attribute(&self, id: EventId, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_attribute(id, key).await
    }

    async fn set_attribute(&self, id: EventId, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_attribute(id, key, value).await
    }

    async fn attach_image(&self, id: EventId, attachment: Attachment) -> Result<(), StoreError> {
        self.inner.attach_image(id, attachment).await
    }
}

pub struct Harness {
    pub store: Arc<JsonEventStore>,
    pub sideloader: Arc<RecordingSideloader>,
    pub importer: Arc<Importer>,
}

pub fn harness() -> Harness {
    let store = Arc::new(JsonEventStore::in_memory());
    let sideloader = Arc::new(RecordingSideloader::default());
    let importer = Arc::new(Importer::new(
        Client::new(),
        store.clone(),
        sideloader.clone(),
    ));
    Harness {
        store,
        sideloader,
        importer,
    }
}
