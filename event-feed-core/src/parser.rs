use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use chrono_tz::Tz;
use futures_util::StreamExt;
use regex::Regex;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::ImportError;
use crate::feed::{FeedItem, NormalizedEvent, CONTENT_NS};
use crate::log::ImportLog;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024;

static NS_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s+xmlns(?::([A-Za-z_][\w.-]*))?\s*=\s*(?:"[^"]*"|'[^']*')"#)
        .expect("valid namespace declaration pattern")
});

/// Fetches `url` and parses it into normalized events, in feed order.
pub async fn fetch_and_parse(
    client: &Client,
    url: &str,
    timeout: Duration,
    tz: Tz,
    log: &mut ImportLog,
) -> Result<Vec<NormalizedEvent>, ImportError> {
    log.info(format!("fetching feed {url}"));
    let body = fetch_feed(client, url, timeout).await?;
    parse_document(&body, tz, log)
}

/// GETs the feed body. Anything but `200 OK` is rejected.
pub async fn fetch_feed(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, ImportError> {
    let response = client.get(url).timeout(timeout).send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(ImportError::BadStatus(status.as_u16()));
    }

    let body = read_limited_bytes(response, MAX_FEED_SIZE)
        .await?
        .ok_or(ImportError::ResponseTooLarge)?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ImportError::EmptyBody);
    }
    debug!(url, bytes = body.len(), "feed downloaded");
    Ok(body)
}

/// Reads the whole body, or `None` once it exceeds `limit` bytes.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Option<Vec<u8>>, reqwest::Error> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Ok(None);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Ok(None);
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(Some(bytes))
}

/// Parses a feed document into normalized events.
///
/// Items without a usable identifier or start date are logged and dropped;
/// they never fail the whole document.
pub fn parse_document(
    body: &[u8],
    tz: Tz,
    log: &mut ImportLog,
) -> Result<Vec<NormalizedEvent>, ImportError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ImportError::EmptyBody);
    }

    let text = String::from_utf8_lossy(body);
    let xml = dedupe_namespace_declarations(&text);

    let channel = match rss::Channel::read_from(xml.as_bytes()) {
        Ok(channel) => channel,
        Err(rss::Error::Eof | rss::Error::InvalidStartTag) => return Err(ImportError::NoChannel),
        Err(e) => return Err(ImportError::XmlParse(e.to_string())),
    };

    let content_ns_declared = channel.namespaces().contains_key(CONTENT_NS);
    let mut events = Vec::with_capacity(channel.items().len());

    for item in channel.items() {
        let parsed = FeedItem::from_rss_item(item, content_ns_declared);
        if parsed.guid.is_empty() {
            log.warn(format!(
                "skipping item \"{}\": no guid or link to identify it",
                parsed.title
            ));
            continue;
        }

        let guid = parsed.guid.clone();
        let pub_date = parsed.pub_date.clone();
        match parsed.normalize(tz) {
            Some(event) => events.push(event),
            None => log.warn(format!(
                "skipping item {guid}: could not determine a start date (pubDate \"{pub_date}\")"
            )),
        }
    }

    log.info(format!(
        "parsed {} of {} feed items",
        events.len(),
        channel.items().len()
    ));
    Ok(events)
}

/// Keeps only the first namespace declaration of each prefix on the root element.
pub fn dedupe_namespace_declarations(xml: &str) -> Cow<'_, str> {
    let Some((start, end)) = root_tag_span(xml) else {
        return Cow::Borrowed(xml);
    };
    let tag = &xml[start..end];

    let mut seen = HashSet::new();
    let mut cleaned = String::with_capacity(tag.len());
    let mut last = 0;
    let mut dropped = false;

    for caps in NS_DECLARATION.captures_iter(tag) {
        let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if seen.insert(prefix.to_owned()) {
            continue;
        }
        let Some(whole) = caps.get(0) else { continue };
        cleaned.push_str(&tag[last..whole.start()]);
        last = whole.end();
        dropped = true;
    }

    if !dropped {
        return Cow::Borrowed(xml);
    }
    cleaned.push_str(&tag[last..]);

    let mut out = String::with_capacity(xml.len());
    out.push_str(&xml[..start]);
    out.push_str(&cleaned);
    out.push_str(&xml[end..]);
    Cow::Owned(out)
}

/// Byte span of the first element start tag, skipping the XML declaration,
/// processing instructions, comments and doctype.
fn root_tag_span(xml: &str) -> Option<(usize, usize)> {
    let bytes = xml.as_bytes();
    let mut pos = 0;
    while let Some(offset) = xml[pos..].find('<') {
        let start = pos + offset;
        match bytes.get(start + 1) {
            Some(b'?') => pos = start + xml[start..].find("?>")? + 2,
            Some(b'!') if xml[start..].starts_with("<!--") => {
                pos = start + xml[start..].find("-->")? + 3
            }
            Some(b'!') => pos = start + xml[start..].find('>')? + 1,
            Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {
                return tag_end(bytes, start).map(|end| (start, end));
            }
            _ => pos = start + 1,
        }
    }
    None
}

/// Index one past the `>` closing the tag at `start`, honoring quoted values.
fn tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        match (quote, b) {
            (None, b'"' | b'\'') => quote = Some(b),
            (Some(q), _) if b == q => quote = None,
            (None, b'>') => return Some(i + 1),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUPLICATE_NS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:ev="http://purl.org/rss/2.0/modules/event/" xmlns:ev="http://purl.org/rss/2.0/modules/event/">
<channel><title>Events</title>
<item>
  <title>Workshop</title><link>https://src.example/workshop/</link><guid>w-1</guid>
  <pubDate>Mon, 21 Oct 2024 07:28:00 +0000</pubDate>
  <ev:startdate>2024-11-05T18:00:00+00:00</ev:startdate>
</item>
</channel></rss>"#;

    #[test]
    fn drops_repeated_prefix_declarations() {
        let cleaned = dedupe_namespace_declarations(DUPLICATE_NS);
        assert_eq!(cleaned.matches("xmlns:ev=").count(), 1);
        assert_eq!(cleaned.matches("xmlns:content=").count(), 1);
        assert!(cleaned.contains("<ev:startdate>"));
    }

    #[test]
    fn keeps_first_declaration_of_each_prefix() {
        let xml = r#"<rss xmlns:a="first" xmlns:b='b' xmlns:a="second"><channel/></rss>"#;
        assert_eq!(
            dedupe_namespace_declarations(xml),
            r#"<rss xmlns:a="first" xmlns:b='b'><channel/></rss>"#
        );
    }

    #[test]
    fn leaves_documents_without_duplicates_untouched() {
        let xml = r#"<!-- generator --><rss version="2.0" xmlns:ev="e"><channel/></rss>"#;
        assert!(matches!(dedupe_namespace_declarations(xml), Cow::Borrowed(_)));
    }

    #[test]
    fn only_the_root_element_is_rewritten() {
        let xml = r#"<rss xmlns:ev="e"><channel><x xmlns:ev="e" xmlns:ev="e"/></channel></rss>"#;
        assert!(matches!(dedupe_namespace_declarations(xml), Cow::Borrowed(_)));
    }

    #[test]
    fn duplicate_declarations_still_parse() {
        let mut log = ImportLog::new();
        let events = parse_document(DUPLICATE_NS.as_bytes(), Tz::UTC, &mut log).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].guid, "w-1");
        assert_eq!(events[0].start.to_rfc3339(), "2024-11-05T18:00:00+00:00");
    }

    #[test]
    fn missing_channel_is_reported() {
        let mut log = ImportLog::new();
        let err = parse_document(br#"<?xml version="1.0"?><rss version="2.0"></rss>"#, Tz::UTC, &mut log)
            .unwrap_err();
        assert!(matches!(err, ImportError::NoChannel));
    }

    #[test]
    fn commented_out_channel_is_still_missing() {
        let mut log = ImportLog::new();
        let body = br#"<rss version="2.0"><!-- <channel> moved --></rss>"#;
        let err = parse_document(body, Tz::UTC, &mut log).unwrap_err();
        assert!(matches!(err, ImportError::NoChannel));
    }

    #[test]
    fn malformed_xml_is_reported() {
        let mut log = ImportLog::new();
        let body = br#"<rss version="2.0"><channel><title>T</title><item><title>A</item></channel></rss>"#;
        let err = parse_document(body, Tz::UTC, &mut log).unwrap_err();
        assert!(matches!(err, ImportError::XmlParse(_)));
    }

    #[test]
    fn blank_body_is_empty() {
        let mut log = ImportLog::new();
        assert!(matches!(
            parse_document(b"  \n", Tz::UTC, &mut log),
            Err(ImportError::EmptyBody)
        ));
    }

    #[test]
    fn undatable_items_are_skipped_and_logged() {
        let body = br#"<rss version="2.0"><channel><title>T</title>
            <item><title>A</title><guid>a</guid><pubDate>Mon, 21 Oct 2024 07:28:00 +0000</pubDate></item>
            <item><title>B</title><guid>b</guid><pubDate>soon</pubDate></item>
            <item><title>C</title><guid>c</guid><pubDate>Tue, 22 Oct 2024 07:28:00 +0000</pubDate></item>
        </channel></rss>"#;
        let mut log = ImportLog::new();
        let events = parse_document(body, Tz::UTC, &mut log).unwrap();
        let guids: Vec<_> = events.iter().map(|e| e.guid.as_str()).collect();
        assert_eq!(guids, vec!["a", "c"]);
        assert_eq!(log.count(crate::log::LogLevel::Warn), 1);
    }
}
