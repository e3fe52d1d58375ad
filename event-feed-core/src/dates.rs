//! Start/end resolution for feed items.
//!
//! The start instant comes from the first source that parses, in order:
//! the namespaced ISO-8601 `ev:startdate`, the RFC-2822 `pubDate`, then a
//! loose parse of `pubDate` read as local time in the destination timezone.
//! The end instant only ever comes from `ev:enddate`.
//!
//! Resolved instants live in the destination timezone and are truncated to
//! the minute, which is the finest granularity the event store keeps.

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDates {
    pub start: DateTime<Tz>,
    pub end: Option<DateTime<Tz>>,
}

impl ResolvedDates {
    /// The explicit end, or `start + hours` when the feed gave none.
    pub fn end_or_default(&self, hours: u32) -> DateTime<Tz> {
        self.end
            .unwrap_or_else(|| self.start + Duration::hours(i64::from(hours)))
    }
}

/// An instant decomposed the way the event store consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateParts {
    pub date: NaiveDate,
    pub hour: u32,
    pub minute: u32,
}

impl<T: TimeZone> From<&DateTime<T>> for DateParts {
    fn from(dt: &DateTime<T>) -> Self {
        Self {
            date: dt.date_naive(),
            hour: dt.hour(),
            minute: dt.minute(),
        }
    }
}

/// Resolves an item's dates. `None` means no start could be determined and the
/// item must be skipped.
pub fn resolve(
    pub_date: &str,
    ns_start: Option<&str>,
    ns_end: Option<&str>,
    tz: Tz,
) -> Option<ResolvedDates> {
    let start = ns_start
        .and_then(|s| parse_iso8601(s, tz))
        .or_else(|| parse_rfc2822(pub_date, tz))
        .or_else(|| parse_loose(pub_date, tz))?;
    let end = ns_end.and_then(|s| parse_iso8601(s, tz));

    Some(ResolvedDates { start, end })
}

const ISO_LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parses an ISO-8601 timestamp. Offset-less values are read as local time in `tz`.
pub fn parse_iso8601(value: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(to_destination(dt, tz));
    }
    for fmt in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(to_destination(dt, tz));
        }
    }
    for fmt in ISO_LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return localize(naive, tz);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| localize(date.and_time(NaiveTime::MIN), tz))
}

/// Strict RFC-2822 parse, converted into `tz`.
pub fn parse_rfc2822(value: &str, tz: Tz) -> Option<DateTime<Tz>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| to_destination(dt, tz))
}

const LOOSE_OFFSET_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y/%m/%d %H:%M:%S %z",
];

const LOOSE_DATETIME_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%d %b %Y %I:%M %p",
    "%b %d, %Y %H:%M:%S",
    "%b %d, %Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%b %d %Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%m/%d/%Y %H:%M",
];

const LOOSE_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d %b %Y", "%b %d, %Y", "%b %d %Y", "%d.%m.%Y", "%m/%d/%Y",
];

/// Best-effort parse of a free-form date. Values without a numeric offset are
/// read as local time in `tz`; a trailing zone abbreviation is ignored.
pub fn parse_loose(value: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let cleaned = normalize_loose(value);
    if cleaned.is_empty() {
        return None;
    }

    for fmt in LOOSE_OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&cleaned, fmt) {
            return Some(to_destination(dt, tz));
        }
    }

    let local = strip_zone_abbreviation(&cleaned);
    for fmt in LOOSE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(local, fmt) {
            return localize(naive, tz);
        }
    }
    for fmt in LOOSE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(local, fmt) {
            return localize(date.and_time(NaiveTime::MIN), tz);
        }
    }
    None
}

/// Drops a leading weekday and collapses whitespace.
fn normalize_loose(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.split_once(' ') {
        Some((first, rest)) if is_weekday(first.trim_end_matches(',')) => rest.to_owned(),
        _ => collapsed,
    }
}

fn is_weekday(token: &str) -> bool {
    const DAYS: [&str; 7] = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ];
    let token = token.to_ascii_lowercase();
    token.len() >= 3 && DAYS.iter().any(|d| d.starts_with(&token))
}

fn strip_zone_abbreviation(value: &str) -> &str {
    match value.rsplit_once(' ') {
        Some((head, last))
            if (2..=5).contains(&last.len())
                && last.chars().all(|c| c.is_ascii_uppercase())
                && !matches!(last, "AM" | "PM") =>
        {
            head
        }
        _ => value,
    }
}

fn to_destination(dt: DateTime<FixedOffset>, tz: Tz) -> DateTime<Tz> {
    truncate_to_minute(dt.with_timezone(&tz))
}

fn localize(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Tz>> {
    // A local time inside a DST gap does not exist; move past the gap.
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(truncate_to_minute)
}

fn truncate_to_minute(dt: DateTime<Tz>) -> DateTime<Tz> {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}
