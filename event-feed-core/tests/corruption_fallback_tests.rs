use chrono::DateTime;
use event_feed_core::{EventFields, EventStore, JsonEventStore, PostStatus};

fn sample_fields(title: &str) -> EventFields {
    EventFields {
        title: title.into(),
        body: String::new(),
        link: "http://example.com/event".into(),
        status: PostStatus::Publish,
        start: DateTime::parse_from_rfc3339("2024-05-01T18:00:00+00:00").unwrap(),
        end: DateTime::parse_from_rfc3339("2024-05-01T20:00:00+00:00").unwrap(),
    }
}

#[tokio::test]
async fn load_uses_tmp_fallback_on_corrupted_json() {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "event_feed_corrupt_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis()
    ));
    tokio::fs::create_dir_all(&dir).await.unwrap();

    // A good copy left in the tmp slot by an interrupted write.
    let scratch = dir.join("scratch.json");
    let valid = JsonEventStore::load_from(&scratch).await;
    let id = valid.create("g-1", sample_fields("Recovered")).await.unwrap();
    let events_path = dir.join("events.json");
    tokio::fs::rename(&scratch, events_path.with_extension("json.tmp"))
        .await
        .unwrap();

    tokio::fs::write(&events_path, b"{ this is not json ")
        .await
        .unwrap();

    let store = JsonEventStore::load_from(&events_path).await;
    assert_eq!(
        store.find_by_external_id("g-1").await.unwrap(),
        Some(id),
        "should fall back to tmp file when main is corrupted"
    );

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn load_starts_empty_when_nothing_is_readable() {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "event_feed_empty_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis()
    ));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join("events.json");
    tokio::fs::write(&path, b"[1, 2").await.unwrap();

    let store = JsonEventStore::load_from(&path).await;
    assert!(store.events().await.is_empty());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}
