use anyhow::Result;
use event_feed_core::{
    DateParts, ImportSettings, ImportSummary, LogLevel, NormalizedEvent, PersistedEvent,
};

const EXCERPT_WIDTH: usize = 80;

pub fn print_summary(summary: &ImportSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let c = summary.counts;
    println!(
        "created {}, updated {}, skipped {}, failed {}",
        c.created, c.updated, c.skipped, c.failed
    );
    for line in summary.log.lines() {
        if line.level != LogLevel::Info {
            println!("  {}", line.message);
        }
    }
    Ok(())
}

pub fn print_preview(events: &[NormalizedEvent], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(events)?);
        return Ok(());
    }

    for event in events {
        let start = format_parts(&DateParts::from(&event.start));
        let end = event
            .end
            .as_ref()
            .map(|end| format_parts(&DateParts::from(end)))
            .unwrap_or_else(|| "(default duration)".to_owned());
        println!("{} [{}]", event.title, event.guid);
        println!("  {start} -> {end}");
        if !event.image_url.is_empty() {
            println!("  image: {}", event.image_url);
        }
        let text = html2text::from_read(event.body.as_bytes(), EXCERPT_WIDTH);
        if let Some(first) = text.lines().find(|l| !l.trim().is_empty()) {
            println!("  {first}");
        }
    }
    println!("{} events", events.len());
    Ok(())
}

pub fn print_events(events: &[PersistedEvent], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(events)?);
        return Ok(());
    }

    for event in events {
        let f = &event.fields;
        println!(
            "#{} {:?} {} | {} -> {}",
            event.id,
            f.status,
            f.title,
            format_parts(&f.start_parts()),
            format_parts(&f.end_parts())
        );
    }
    Ok(())
}

pub fn print_settings(settings: &ImportSettings, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(settings)?);
        return Ok(());
    }

    println!("feed_url:        {}", settings.feed_url);
    println!("duration:        {}h", settings.duration_hours);
    println!("default_status:  {:?}", settings.default_status);
    println!("update_existing: {}", settings.update_existing);
    println!("schedule:        {:?}", settings.schedule);
    println!("timezone:        {}", settings.timezone);
    println!("timeout:         {}s", settings.request_timeout_seconds);
    Ok(())
}

fn format_parts(parts: &DateParts) -> String {
    format!("{} {:02}:{:02}", parts.date, parts.hour, parts.minute)
}
