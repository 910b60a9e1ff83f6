//! Canonical event types.
//!
//! Both calendar sides normalize into these types, and the engine works
//! exclusively with them for classification, pairing and writes.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RedactionMode;

/// Which calendar platform an event lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Outlook,
    Google,
}

impl Origin {
    /// The other side of the bridge.
    pub fn opposite(self) -> Origin {
        match self {
            Origin::Outlook => Origin::Google,
            Origin::Google => Origin::Outlook,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Outlook => "outlook",
            Origin::Google => "google",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outlook" => Ok(Origin::Outlook),
            "google" => Ok(Origin::Google),
            other => Err(format!("unknown origin '{other}'")),
        }
    }
}

/// Event start/end after normalization.
///
/// Timed events are always UTC; all-day events keep their calendar date.
/// End is exclusive for all-day events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTime {
    Date(NaiveDate),
    Utc(DateTime<Utc>),
}

impl EventTime {
    /// Check if this is an all-day date (not an instant).
    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Instant view for window and ordering comparisons. All-day dates map
    /// to midnight UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            EventTime::Date(d) => d.and_time(NaiveTime::MIN).and_utc(),
            EventTime::Utc(dt) => *dt,
        }
    }
}

/// Whether an event blocks time on the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyStatus {
    Busy,
    Free,
}

/// Event visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    Private,
    Public,
}

/// Provider-side marker identifying an event as a BridgeCal mirror.
///
/// `source_id` is the source's native id on the opposite side. Marker
/// presence is what keeps mirrors from ever being treated as sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorMarker {
    pub origin_of_source: Origin,
    pub source_id: String,
}

/// A single logical appointment instance, normalized from either side.
///
/// Immutable for the duration of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub origin: Origin,
    /// Native identifier in `origin`'s system; opaque, stable within the
    /// window.
    pub source_id: String,
    pub start: EventTime,
    pub end: EventTime,
    pub summary: String,
    pub location: String,
    pub description: String,
    pub busy_status: BusyStatus,
    pub privacy: Privacy,
    pub last_modified: Option<DateTime<Utc>>,
    pub mirror_marker: Option<MirrorMarker>,
}

impl CanonicalEvent {
    pub fn is_all_day(&self) -> bool {
        self.start.is_date()
    }

    pub fn is_mirror(&self) -> bool {
        self.mirror_marker.is_some()
    }

    /// The canonical payload a mirror write carries to the opposite side.
    ///
    /// Mirrors are always private and busy, never carry attendees, and carry
    /// the marker pointing back at this event. Under busy-only redaction the
    /// content fields are suppressed at write time.
    pub fn mirror_payload(&self, redaction: RedactionMode) -> CanonicalEvent {
        let (summary, location, description) = match redaction {
            RedactionMode::None => (
                self.summary.clone(),
                self.location.clone(),
                self.description.clone(),
            ),
            RedactionMode::BusyOnly => ("Busy".to_string(), String::new(), String::new()),
        };

        CanonicalEvent {
            origin: self.origin.opposite(),
            source_id: String::new(),
            start: self.start,
            end: self.end,
            summary,
            location,
            description,
            busy_status: BusyStatus::Busy,
            privacy: Privacy::Private,
            last_modified: None,
            mirror_marker: Some(MirrorMarker {
                origin_of_source: self.origin,
                source_id: self.source_id.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source_event() -> CanonicalEvent {
        CanonicalEvent {
            origin: Origin::Outlook,
            source_id: "o-1".to_string(),
            start: EventTime::Utc(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()),
            end: EventTime::Utc(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()),
            summary: "Planning".to_string(),
            location: "Room 4".to_string(),
            description: "Quarterly planning".to_string(),
            busy_status: BusyStatus::Free,
            privacy: Privacy::Public,
            last_modified: None,
            mirror_marker: None,
        }
    }

    #[test]
    fn mirror_payload_forces_private_and_busy() {
        let payload = source_event().mirror_payload(RedactionMode::None);

        assert_eq!(payload.privacy, Privacy::Private);
        assert_eq!(payload.busy_status, BusyStatus::Busy);
        assert_eq!(payload.origin, Origin::Google);
        assert_eq!(payload.summary, "Planning");
        assert_eq!(
            payload.mirror_marker,
            Some(MirrorMarker {
                origin_of_source: Origin::Outlook,
                source_id: "o-1".to_string(),
            })
        );
    }

    #[test]
    fn mirror_payload_busy_only_suppresses_content() {
        let payload = source_event().mirror_payload(RedactionMode::BusyOnly);

        assert_eq!(payload.summary, "Busy");
        assert!(payload.location.is_empty());
        assert!(payload.description.is_empty());
        // Times still mirror so availability stays correct.
        assert_eq!(payload.start, source_event().start);
    }

    #[test]
    fn origin_round_trips_through_str() {
        assert_eq!("outlook".parse::<Origin>().unwrap(), Origin::Outlook);
        assert_eq!("google".parse::<Origin>().unwrap(), Origin::Google);
        assert!("exchange".parse::<Origin>().is_err());
        assert_eq!(Origin::Outlook.opposite(), Origin::Google);
    }
}
