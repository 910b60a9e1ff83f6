//! The rolling sync window.

use chrono::{DateTime, Duration, Utc};

use crate::event::CanonicalEvent;

pub const DEFAULT_PAST_DAYS: i64 = 30;
pub const DEFAULT_FUTURE_DAYS: i64 = 180;

/// The `[now − past_days, now + future_days)` interval scanned per tick.
#[derive(Debug, Clone, Copy)]
pub struct SyncWindow {
    pub past_days: i64,
    pub future_days: i64,
}

impl Default for SyncWindow {
    fn default() -> Self {
        SyncWindow {
            past_days: DEFAULT_PAST_DAYS,
            future_days: DEFAULT_FUTURE_DAYS,
        }
    }
}

impl SyncWindow {
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now - Duration::days(self.past_days),
            now + Duration::days(self.future_days),
        )
    }

    /// An event is in the window if any instant of it lies inside.
    pub fn contains(&self, event: &CanonicalEvent, now: DateTime<Utc>) -> bool {
        let (from, to) = self.bounds(now);
        event.start.to_utc() < to && event.end.to_utc() > from
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{BusyStatus, EventTime, Origin, Privacy};
    use chrono::TimeZone;

    fn event(start: DateTime<Utc>, end: DateTime<Utc>) -> CanonicalEvent {
        CanonicalEvent {
            origin: Origin::Outlook,
            source_id: "o-1".to_string(),
            start: EventTime::Utc(start),
            end: EventTime::Utc(end),
            summary: String::new(),
            location: String::new(),
            description: String::new(),
            busy_status: BusyStatus::Busy,
            privacy: Privacy::Public,
            last_modified: None,
            mirror_marker: None,
        }
    }

    #[test]
    fn bounds_span_past_and_future() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let window = SyncWindow::default();
        let (from, to) = window.bounds(now);
        assert_eq!(from, now - Duration::days(30));
        assert_eq!(to, now + Duration::days(180));
    }

    #[test]
    fn boundary_crossing_events_are_included() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let window = SyncWindow {
            past_days: 1,
            future_days: 1,
        };

        // Starts before the window, ends inside it.
        let crossing = event(now - Duration::days(2), now - Duration::hours(1));
        assert!(window.contains(&crossing, now));

        // Entirely before the window.
        let past = event(now - Duration::days(3), now - Duration::days(2));
        assert!(!window.contains(&past, now));

        // Entirely after the window.
        let future = event(now + Duration::days(2), now + Duration::days(3));
        assert!(!window.contains(&future, now));
    }
}
