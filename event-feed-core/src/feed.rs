use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use url::Url;

use crate::dates::{self, ResolvedDates};
use crate::html;

/// Namespace prefix of the custom event fields.
pub const EVENT_NS: &str = "ev";
/// Namespace prefix of `content:encoded`.
pub const CONTENT_NS: &str = "content";

/// The raw, event-relevant fields of one RSS item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub pub_date: String,
    pub ns_start: Option<String>,
    pub ns_end: Option<String>,
    pub body_html: String,
    pub image_url: String,
}

impl FeedItem {
    /// Extracts the fields from an `rss::Item`.
    ///
    /// `content:encoded` is preferred over `description` for the body only when
    /// the feed declares the `content` namespace. The image is looked for in
    /// `description` first.
    pub fn from_rss_item(item: &rss::Item, content_ns_declared: bool) -> Self {
        let description = non_empty(item.description());
        let encoded = non_empty(item.content());

        let body_html = if content_ns_declared {
            encoded.or(description)
        } else {
            description.or(encoded)
        }
        .unwrap_or_default()
        .to_owned();

        let image_source = description.unwrap_or(body_html.as_str());
        let mut image_url = html::first_image(image_source);
        if image_url.is_empty() && image_source != body_html {
            image_url = html::first_image(&body_html);
        }

        let link = item.link().unwrap_or_default().trim().to_owned();
        let image_url = absolutize(&image_url, &link);
        // Without a GUID the link is the only stable key left.
        let guid = item
            .guid()
            .map(|g| g.value().trim())
            .filter(|g| !g.is_empty())
            .unwrap_or(link.as_str())
            .to_owned();

        Self {
            guid,
            title: html::strip_tags(item.title().unwrap_or_default()),
            link,
            pub_date: item.pub_date().unwrap_or_default().trim().to_owned(),
            ns_start: event_extension(item, "startdate"),
            ns_end: event_extension(item, "enddate"),
            body_html,
            image_url,
        }
    }

    /// Resolves dates and builds the normalized record, or `None` when no start
    /// date can be determined.
    pub fn normalize(self, tz: Tz) -> Option<NormalizedEvent> {
        let ResolvedDates { start, end } = dates::resolve(
            &self.pub_date,
            self.ns_start.as_deref(),
            self.ns_end.as_deref(),
            tz,
        )?;

        Some(NormalizedEvent {
            guid: self.guid,
            title: self.title,
            link: self.link,
            start,
            end,
            body: html::strip_first_image(&self.body_html),
            image_url: self.image_url,
        })
    }
}

/// One event, ready to be reconciled against the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEvent {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub start: DateTime<Tz>,
    /// `None` means the configured default duration applies.
    pub end: Option<DateTime<Tz>>,
    pub body: String,
    pub image_url: String,
}

impl NormalizedEvent {
    pub fn dates(&self) -> ResolvedDates {
        ResolvedDates {
            start: self.start,
            end: self.end,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Resolves a relative image reference against the item link.
fn absolutize(image_url: &str, link: &str) -> String {
    if image_url.is_empty() || Url::parse(image_url).is_ok() {
        return image_url.to_owned();
    }
    Url::parse(link)
        .and_then(|base| base.join(image_url))
        .map(String::from)
        .unwrap_or_else(|_| image_url.to_owned())
}

fn event_extension(item: &rss::Item, name: &str) -> Option<String> {
    item.extensions()
        .get(EVENT_NS)
        .and_then(|fields| fields.get(name))
        .and_then(|values| values.first())
        .and_then(|ext| ext.value())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}
