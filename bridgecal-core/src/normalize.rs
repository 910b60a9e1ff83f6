//! Conversion of adapter-shaped records into canonical events.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::event::{BusyStatus, CanonicalEvent, EventTime, MirrorMarker, Origin, Privacy};
use crate::fingerprint::collapse_whitespace;

/// Raw event shape as providers emit it over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    pub start: Option<RawTime>,
    pub end: Option<RawTime>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub busy_status: Option<BusyStatus>,
    #[serde(default)]
    pub privacy: Option<Privacy>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    /// Marker fields the provider found in its property bag, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<RawMarker>,
}

/// Provider-reported marker pair (origin string + opposite-side id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMarker {
    pub origin: String,
    pub source_id: String,
}

/// The three datetime forms providers send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawTime {
    /// All-day calendar date.
    Date(NaiveDate),
    /// Instant with explicit offset (RFC 3339 on the wire).
    Instant(DateTime<Utc>),
    /// Wall-clock time in a named IANA zone (Outlook reports these).
    Zoned {
        date_time: NaiveDateTime,
        time_zone: String,
    },
}

/// Raised when a raw record cannot be represented canonically.
#[derive(Error, Debug)]
#[error("malformed event {id}: {reason}")]
pub struct MalformedEvent {
    pub id: String,
    pub reason: String,
}

fn malformed(id: &str, reason: impl Into<String>) -> MalformedEvent {
    MalformedEvent {
        id: id.to_string(),
        reason: reason.into(),
    }
}

/// Convert an adapter-shaped record to canonical form.
///
/// Timed events resolve to UTC (whole seconds); all-day events keep their
/// calendar dates. Start and end must both be present, agree in form, and
/// end may not precede start.
pub fn normalize(raw: RawEvent, origin: Origin) -> Result<CanonicalEvent, MalformedEvent> {
    let start = resolve_time(raw.start.as_ref(), &raw.id, "start")?;
    let end = resolve_time(raw.end.as_ref(), &raw.id, "end")?;

    let (start, end) = match (start, end) {
        (EventTime::Date(s), EventTime::Date(e)) => {
            if e < s {
                return Err(malformed(&raw.id, "end precedes start"));
            }
            // Exclusive end: a single-day event may arrive with end == start.
            let e = if e == s { s + Days::new(1) } else { e };
            (EventTime::Date(s), EventTime::Date(e))
        }
        (EventTime::Utc(s), EventTime::Utc(e)) => {
            if e < s {
                return Err(malformed(&raw.id, "end precedes start"));
            }
            (EventTime::Utc(s), EventTime::Utc(e))
        }
        _ => return Err(malformed(&raw.id, "start and end mix all-day and timed forms")),
    };

    let marker = raw.marker.map(|m| {
        let origin_of_source = match m.origin.parse::<Origin>() {
            Ok(o) if o != origin => o,
            // A marker always makes the item a mirror; a bad origin value
            // can only reference the opposite side.
            _ => {
                warn!(id = %raw.id, side = %origin, "marker origin invalid, assuming opposite side");
                origin.opposite()
            }
        };
        MirrorMarker {
            origin_of_source,
            source_id: m.source_id,
        }
    });

    Ok(CanonicalEvent {
        origin,
        source_id: raw.id,
        start,
        end,
        summary: collapse_whitespace(raw.summary.as_deref().unwrap_or_default()),
        location: collapse_whitespace(raw.location.as_deref().unwrap_or_default()),
        description: collapse_whitespace(raw.description.as_deref().unwrap_or_default()),
        busy_status: raw.busy_status.unwrap_or(BusyStatus::Busy),
        privacy: raw.privacy.unwrap_or(Privacy::Public),
        last_modified: raw.last_modified.map(truncate_seconds),
        mirror_marker: marker,
    })
}

fn resolve_time(time: Option<&RawTime>, id: &str, field: &str) -> Result<EventTime, MalformedEvent> {
    let time = time.ok_or_else(|| malformed(id, format!("missing {field}")))?;
    match time {
        RawTime::Date(d) => Ok(EventTime::Date(*d)),
        RawTime::Instant(dt) => Ok(EventTime::Utc(truncate_seconds(*dt))),
        RawTime::Zoned {
            date_time,
            time_zone,
        } => {
            let tz: chrono_tz::Tz = time_zone
                .parse()
                .map_err(|_| malformed(id, format!("unknown time zone '{time_zone}'")))?;
            let local = tz
                .from_local_datetime(date_time)
                .earliest()
                .ok_or_else(|| malformed(id, format!("nonexistent local time in '{time_zone}'")))?;
            Ok(EventTime::Utc(truncate_seconds(local.with_timezone(&Utc))))
        }
    }
}

fn truncate_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}
