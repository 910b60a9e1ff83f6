//! End-to-end reconciliation scenarios against in-memory calendars.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use bridgecal_core::adapter::{AdapterError, CalendarAdapter, EventPage};
use bridgecal_core::config::RedactionMode;
use bridgecal_core::event::{BusyStatus, CanonicalEvent, EventTime, Origin, Privacy};
use bridgecal_core::normalize::{RawEvent, RawMarker, RawTime};
use bridgecal_core::store::{MappingStore, CURSOR_GOOGLE_SYNC_TOKEN, CURSOR_LAST_OUTLOOK_SCAN_AT};
use bridgecal_core::sync::{Engine, TickSummary};
use bridgecal_core::window::SyncWindow;

/// In-memory calendar standing in for one side.
struct MockCalendar {
    origin: Origin,
    events: Mutex<BTreeMap<String, RawEvent>>,
    next_id: Mutex<u32>,
    /// Number of upcoming create calls to fail with a transient error.
    fail_creates: Mutex<u32>,
    /// Fail the next create as if the provider binary were missing.
    fail_create_not_installed: Mutex<bool>,
    write_count: Mutex<u32>,
    cursor_to_return: Mutex<Option<String>>,
    cursors_seen: Mutex<Vec<Option<String>>>,
}

impl MockCalendar {
    fn new(origin: Origin) -> Self {
        MockCalendar {
            origin,
            events: Mutex::new(BTreeMap::new()),
            next_id: Mutex::new(0),
            fail_creates: Mutex::new(0),
            fail_create_not_installed: Mutex::new(false),
            write_count: Mutex::new(0),
            cursor_to_return: Mutex::new(None),
            cursors_seen: Mutex::new(Vec::new()),
        }
    }

    fn insert(&self, raw: RawEvent) {
        self.events.lock().unwrap().insert(raw.id.clone(), raw);
    }

    fn remove(&self, id: &str) {
        self.events.lock().unwrap().remove(id);
    }

    fn get(&self, id: &str) -> Option<RawEvent> {
        self.events.lock().unwrap().get(id).cloned()
    }

    fn all(&self) -> Vec<RawEvent> {
        self.events.lock().unwrap().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    fn mutate<F: FnOnce(&mut RawEvent)>(&self, id: &str, f: F) {
        let mut events = self.events.lock().unwrap();
        f(events.get_mut(id).expect("event to mutate"));
    }

    fn writes(&self) -> u32 {
        *self.write_count.lock().unwrap()
    }

    fn fail_next_creates(&self, n: u32) {
        *self.fail_creates.lock().unwrap() = n;
    }

    fn fail_next_create_not_installed(&self) {
        *self.fail_create_not_installed.lock().unwrap() = true;
    }

    fn return_cursor(&self, cursor: &str) {
        *self.cursor_to_return.lock().unwrap() = Some(cursor.to_string());
    }

    fn cursors_seen(&self) -> Vec<Option<String>> {
        self.cursors_seen.lock().unwrap().clone()
    }
}

fn raw_time(t: &EventTime) -> RawTime {
    match t {
        EventTime::Date(d) => RawTime::Date(*d),
        EventTime::Utc(dt) => RawTime::Instant(*dt),
    }
}

/// The conversion a real provider performs when writing a canonical payload.
fn raw_from_canonical(event: &CanonicalEvent, id: &str, previous: Option<&RawEvent>) -> RawEvent {
    RawEvent {
        id: id.to_string(),
        start: Some(raw_time(&event.start)),
        end: Some(raw_time(&event.end)),
        summary: Some(event.summary.clone()),
        location: Some(event.location.clone()),
        description: Some(event.description.clone()),
        busy_status: Some(event.busy_status),
        privacy: Some(event.privacy),
        last_modified: event
            .last_modified
            .or(previous.and_then(|p| p.last_modified)),
        marker: event
            .mirror_marker
            .as_ref()
            .map(|m| RawMarker {
                origin: m.origin_of_source.as_str().to_string(),
                source_id: m.source_id.clone(),
            })
            .or_else(|| previous.and_then(|p| p.marker.clone())),
    }
}

#[async_trait]
impl CalendarAdapter for MockCalendar {
    fn origin(&self) -> Origin {
        self.origin
    }

    async fn list_window(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        cursor: Option<String>,
    ) -> Result<EventPage, AdapterError> {
        self.cursors_seen.lock().unwrap().push(cursor);
        Ok(EventPage {
            events: self.all(),
            cursor: self.cursor_to_return.lock().unwrap().clone(),
        })
    }

    async fn create(&self, event: &CanonicalEvent) -> Result<String, AdapterError> {
        {
            let mut fatal = self.fail_create_not_installed.lock().unwrap();
            if *fatal {
                *fatal = false;
                return Err(AdapterError::NotInstalled(
                    "bridgecal-provider-missing".to_string(),
                ));
            }
        }
        {
            let mut fail = self.fail_creates.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(AdapterError::transient("rate_limit", "simulated failure"));
            }
        }
        *self.write_count.lock().unwrap() += 1;

        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let prefix = match self.origin {
                Origin::Outlook => "o-new",
                Origin::Google => "g-new",
            };
            format!("{prefix}-{}", *next)
        };
        self.insert(raw_from_canonical(event, &id, None));
        Ok(id)
    }

    async fn update(&self, id: &str, event: &CanonicalEvent) -> Result<(), AdapterError> {
        *self.write_count.lock().unwrap() += 1;
        let mut events = self.events.lock().unwrap();
        if let Some(existing) = events.get(id).cloned() {
            events.insert(id.to_string(), raw_from_canonical(event, id, Some(&existing)));
        }
        // Missing target is success.
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), AdapterError> {
        *self.write_count.lock().unwrap() += 1;
        self.events.lock().unwrap().remove(id);
        Ok(())
    }
}

fn t(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, 0).unwrap()
}

fn source_raw(id: &str, summary: &str, modified: Option<DateTime<Utc>>) -> RawEvent {
    RawEvent {
        id: id.to_string(),
        start: Some(RawTime::Instant(t(9, 0))),
        end: Some(RawTime::Instant(t(10, 0))),
        summary: Some(summary.to_string()),
        location: None,
        description: None,
        busy_status: None,
        privacy: None,
        last_modified: modified,
        marker: None,
    }
}

/// Wide enough that the fixed event dates stay in the window no matter when
/// the suite runs.
fn wide_window() -> SyncWindow {
    SyncWindow {
        past_days: 36500,
        future_days: 36500,
    }
}

async fn run_tick(outlook: &MockCalendar, google: &MockCalendar, store: &MappingStore) -> TickSummary {
    run_tick_with(outlook, google, store, RedactionMode::None).await
}

async fn run_tick_with(
    outlook: &MockCalendar,
    google: &MockCalendar,
    store: &MappingStore,
    redaction: RedactionMode,
) -> TickSummary {
    let engine = Engine::new(outlook, google, store, wide_window(), redaction);
    engine.tick(&CancellationToken::new()).await.expect("tick")
}

#[tokio::test]
async fn create_propagates_outlook_to_google() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("O1", "Planning", Some(t(8, 0))));

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.created_google, 1);
    assert_eq!(summary.created_outlook, 0);
    assert_eq!(summary.scanned_outlook, 1);
    assert_eq!(summary.outlook_src, 1);
    assert_eq!(summary.google_mirror, 0);
    assert_eq!(summary.conflicts, 0);
    assert_eq!(summary.errors, 0);

    let mirrors = google.all();
    assert_eq!(mirrors.len(), 1);
    let mirror = &mirrors[0];
    assert_eq!(mirror.summary.as_deref(), Some("Planning"));
    assert_eq!(mirror.privacy, Some(Privacy::Private));
    assert_eq!(mirror.busy_status, Some(BusyStatus::Busy));

    let marker = mirror.marker.as_ref().expect("mirror must carry the marker");
    assert_eq!(marker.origin, "outlook");
    assert_eq!(marker.source_id, "O1");

    let row = store.get_by_outlook("O1").await.unwrap().expect("mapping row");
    assert_eq!(row.google_id, mirror.id);
    assert_eq!(row.origin, Origin::Outlook);
    assert!(row.last_outlook_fingerprint.is_some());
    assert!(row.last_google_fingerprint.is_some());
}

#[tokio::test]
async fn create_propagates_google_to_outlook() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    google.insert(source_raw("G1", "Gym", Some(t(8, 0))));

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.created_outlook, 1);
    assert_eq!(summary.created_google, 0);

    let mirrors = outlook.all();
    assert_eq!(mirrors.len(), 1);
    let marker = mirrors[0].marker.as_ref().expect("marker");
    assert_eq!(marker.origin, "google");
    assert_eq!(marker.source_id, "G1");

    let row = store.get_by_google("G1").await.unwrap().expect("mapping row");
    assert_eq!(row.outlook_id, mirrors[0].id);
    assert_eq!(row.origin, Origin::Google);
}

#[tokio::test]
async fn replay_of_synced_state_is_a_noop() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("O1", "Planning", Some(t(8, 0))));
    outlook.insert(source_raw("O2", "Review", Some(t(8, 30))));
    run_tick(&outlook, &google, &store).await;

    let rows_before = store.list_all().await.unwrap();
    let google_before = google.all();
    let writes_before = outlook.writes() + google.writes();

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.writes(), 0);
    assert_eq!(summary.conflicts, 0);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.scanned_outlook, 2);
    assert_eq!(summary.scanned_google, 2);
    assert_eq!(outlook.writes() + google.writes(), writes_before);
    assert_eq!(store.list_all().await.unwrap(), rows_before);
    assert_eq!(google.all(), google_before);
}

#[tokio::test]
async fn source_update_propagates_to_mirror() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("O1", "Planning", Some(t(8, 0))));
    run_tick(&outlook, &google, &store).await;
    let row_before = store.get_by_outlook("O1").await.unwrap().unwrap();

    outlook.mutate("O1", |e| {
        e.summary = Some("Planning v2".to_string());
        e.last_modified = Some(t(11, 0));
    });

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.updated_google, 1);
    assert_eq!(summary.updated_outlook, 0);
    assert_eq!(summary.conflicts, 0);

    let mirror = google.get(&row_before.google_id).expect("mirror still there");
    assert_eq!(mirror.summary.as_deref(), Some("Planning v2"));
    assert_eq!(mirror.privacy, Some(Privacy::Private));
    assert!(mirror.marker.is_some());

    let row_after = store.get_by_outlook("O1").await.unwrap().unwrap();
    assert_ne!(
        row_after.last_outlook_fingerprint,
        row_before.last_outlook_fingerprint
    );
}

#[tokio::test]
async fn source_delete_propagates_exactly_once() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("O1", "Planning", Some(t(8, 0))));
    run_tick(&outlook, &google, &store).await;
    outlook.remove("O1");

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.deleted_google, 1);
    assert_eq!(google.len(), 0);
    assert_eq!(store.get_by_outlook("O1").await.unwrap(), None);

    let replay = run_tick(&outlook, &google, &store).await;
    assert_eq!(replay.writes(), 0);
    assert_eq!(replay.deleted_google, 0);
}

#[tokio::test]
async fn mirror_edit_is_overwritten_by_source() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("O1", "Planning", Some(t(8, 0))));
    run_tick(&outlook, &google, &store).await;
    let mirror_id = store
        .get_by_outlook("O1")
        .await
        .unwrap()
        .unwrap()
        .google_id;

    // User edits the mirror only; the source has not changed.
    google.mutate(&mirror_id, |e| {
        e.summary = Some("Scribbled over".to_string());
    });

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.updated_google, 1);
    assert_eq!(summary.conflicts, 0);
    assert_eq!(
        google.get(&mirror_id).unwrap().summary.as_deref(),
        Some("Planning")
    );
}

#[tokio::test]
async fn conflict_newer_mirror_wins_and_flows_back() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("O1", "Planning", Some(t(8, 0))));
    run_tick(&outlook, &google, &store).await;
    let mirror_id = store
        .get_by_outlook("O1")
        .await
        .unwrap()
        .unwrap()
        .google_id;

    outlook.mutate("O1", |e| {
        e.summary = Some("Planning outlook edit".to_string());
        e.last_modified = Some(t(11, 0));
    });
    google.mutate(&mirror_id, |e| {
        e.summary = Some("Planning google edit".to_string());
        e.last_modified = Some(t(12, 0));
    });

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.conflicts, 1);
    assert_eq!(summary.updated_outlook, 1);
    assert_eq!(summary.updated_google, 0);
    assert_eq!(
        outlook.get("O1").unwrap().summary.as_deref(),
        Some("Planning google edit")
    );

    let row = store.get_by_outlook("O1").await.unwrap().unwrap();
    assert_eq!(row.origin, Origin::Outlook);

    // Settled: the next tick has nothing to do.
    let replay = run_tick(&outlook, &google, &store).await;
    assert_eq!(replay.writes(), 0);
    assert_eq!(replay.conflicts, 0);
}

#[tokio::test]
async fn conflict_tie_prefers_outlook() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("O1", "Planning", Some(t(8, 0))));
    run_tick(&outlook, &google, &store).await;
    let mirror_id = store
        .get_by_outlook("O1")
        .await
        .unwrap()
        .unwrap()
        .google_id;

    outlook.mutate("O1", |e| {
        e.summary = Some("Planning outlook edit".to_string());
        e.last_modified = Some(t(11, 0));
    });
    google.mutate(&mirror_id, |e| {
        e.summary = Some("Planning google edit".to_string());
        e.last_modified = Some(t(11, 0));
    });

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.conflicts, 1);
    assert_eq!(summary.updated_google, 1);
    assert_eq!(summary.updated_outlook, 0);
    assert_eq!(
        google.get(&mirror_id).unwrap().summary.as_deref(),
        Some("Planning outlook edit")
    );
}

#[tokio::test]
async fn marker_lookup_repairs_a_lost_store() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    // Source already private/busy so the existing mirror matches its payload
    // exactly.
    let mut source = source_raw("O1", "Planning", Some(t(8, 0)));
    source.busy_status = Some(BusyStatus::Busy);
    source.privacy = Some(Privacy::Private);
    outlook.insert(source);

    let mut mirror = source_raw("G9", "Planning", Some(t(8, 5)));
    mirror.busy_status = Some(BusyStatus::Busy);
    mirror.privacy = Some(Privacy::Private);
    mirror.marker = Some(RawMarker {
        origin: "outlook".to_string(),
        source_id: "O1".to_string(),
    });
    google.insert(mirror);

    let summary = run_tick(&outlook, &google, &store).await;

    // No duplicate create, no write at all: the pair is re-adopted.
    assert_eq!(summary.writes(), 0);
    assert_eq!(google.len(), 1);

    let row = store.get_by_outlook("O1").await.unwrap().expect("repaired row");
    assert_eq!(row.google_id, "G9");
    assert!(row.last_outlook_fingerprint.is_some());
}

#[tokio::test]
async fn marker_lookup_repair_overwrites_drifted_mirror() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("O1", "Planning", Some(t(8, 0))));

    let mut mirror = source_raw("G9", "Old title", Some(t(7, 0)));
    mirror.marker = Some(RawMarker {
        origin: "outlook".to_string(),
        source_id: "O1".to_string(),
    });
    google.insert(mirror);

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.created_google, 0);
    assert_eq!(summary.updated_google, 1);
    assert_eq!(google.get("G9").unwrap().summary.as_deref(), Some("Planning"));
    assert!(store.get_by_outlook("O1").await.unwrap().is_some());
}

#[tokio::test]
async fn orphaned_mirror_is_deleted_not_treated_as_source() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    let mut orphan = source_raw("G9", "Stale mirror", None);
    orphan.marker = Some(RawMarker {
        origin: "outlook".to_string(),
        source_id: "O-gone".to_string(),
    });
    google.insert(orphan);

    let summary = run_tick(&outlook, &google, &store).await;

    // Never mirrored back to Outlook, just cleaned up.
    assert_eq!(summary.created_outlook, 0);
    assert_eq!(summary.deleted_google, 1);
    assert_eq!(google.len(), 0);
    assert_eq!(outlook.len(), 0);
}

#[tokio::test]
async fn duplicate_mirrors_are_reduced_to_one() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    let mut source = source_raw("O1", "Planning", Some(t(8, 0)));
    source.busy_status = Some(BusyStatus::Busy);
    source.privacy = Some(Privacy::Private);
    outlook.insert(source);

    for id in ["G1", "G2"] {
        let mut mirror = source_raw(id, "Planning", None);
        mirror.busy_status = Some(BusyStatus::Busy);
        mirror.privacy = Some(Privacy::Private);
        mirror.marker = Some(RawMarker {
            origin: "outlook".to_string(),
            source_id: "O1".to_string(),
        });
        google.insert(mirror);
    }

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.deleted_google, 1);
    assert_eq!(summary.created_google, 0);
    assert_eq!(google.len(), 1);

    let row = store.get_by_outlook("O1").await.unwrap().expect("row");
    assert!(google.get(&row.google_id).is_some());
}

#[tokio::test]
async fn busy_only_redaction_suppresses_content() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    let mut source = source_raw("O1", "1:1 with CFO", Some(t(8, 0)));
    source.location = Some("HQ".to_string());
    source.description = Some("compensation numbers".to_string());
    outlook.insert(source);

    let summary = run_tick_with(&outlook, &google, &store, RedactionMode::BusyOnly).await;

    assert_eq!(summary.created_google, 1);
    let mirror = &google.all()[0];
    assert_eq!(mirror.summary.as_deref(), Some("Busy"));
    assert_eq!(mirror.location.as_deref(), Some(""));
    assert_eq!(mirror.description.as_deref(), Some(""));
    assert_eq!(mirror.privacy, Some(Privacy::Private));
    assert_eq!(mirror.busy_status, Some(BusyStatus::Busy));
}

#[tokio::test]
async fn all_day_events_mirror_as_dates() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    let date = chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let mut source = source_raw("O1", "Offsite", Some(t(8, 0)));
    source.start = Some(RawTime::Date(date));
    source.end = Some(RawTime::Date(date));
    outlook.insert(source);

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.created_google, 1);
    let mirror = &google.all()[0];
    assert_eq!(mirror.start, Some(RawTime::Date(date)));
    // Exclusive end: a one-day event spans to the next date.
    assert_eq!(mirror.end, Some(RawTime::Date(date.succ_opt().unwrap())));
}

#[tokio::test]
async fn malformed_events_are_skipped_without_failing_the_tick() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    let mut broken = source_raw("O1", "Backwards", None);
    broken.start = Some(RawTime::Instant(t(10, 0)));
    broken.end = Some(RawTime::Instant(t(9, 0)));
    outlook.insert(broken);
    outlook.insert(source_raw("O2", "Fine", Some(t(8, 0))));

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.scanned_outlook, 2);
    assert_eq!(summary.outlook_src, 1);
    assert_eq!(summary.created_google, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(google.len(), 1);
}

#[tokio::test]
async fn transient_create_failure_skips_item_and_continues() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("A1", "First", Some(t(8, 0))));
    outlook.insert(source_raw("B2", "Second", Some(t(8, 0))));
    google.fail_next_creates(1);

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.created_google, 1);
    assert_eq!(google.len(), 1);
    // Partial progress means a clean exit.
    assert_eq!(summary.exit_code(), 0);

    // The failed item is retried on the next tick.
    let retry = run_tick(&outlook, &google, &store).await;
    assert_eq!(retry.created_google, 1);
    assert_eq!(retry.errors, 0);
    assert_eq!(google.len(), 2);
}

#[tokio::test]
async fn missing_provider_aborts_the_tick_as_prerequisite_failure() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("A1", "First", Some(t(8, 0))));
    outlook.insert(source_raw("B2", "Second", Some(t(8, 0))));
    google.fail_next_create_not_installed();

    let engine = Engine::new(&outlook, &google, &store, wide_window(), RedactionMode::None);
    let err = engine
        .tick(&CancellationToken::new())
        .await
        .expect_err("missing provider must be fatal");

    assert_eq!(err.exit_code(), 2);
    // Aborted before the second create was attempted.
    assert_eq!(google.len(), 0);
    assert!(store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn tick_with_only_errors_exits_nonzero() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("O1", "Planning", Some(t(8, 0))));
    google.fail_next_creates(1);

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.writes(), 0);
    assert_eq!(summary.exit_code(), 4);
    assert!(store.get_by_outlook("O1").await.unwrap().is_none());
}

#[tokio::test]
async fn cancelled_token_short_circuits_before_any_write() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("O1", "Planning", Some(t(8, 0))));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let engine = Engine::new(&outlook, &google, &store, wide_window(), RedactionMode::None);
    let summary = engine.tick(&cancel).await.expect("tick");

    assert_eq!(summary, TickSummary::default());
    assert_eq!(google.writes(), 0);
    assert_eq!(google.len(), 0);
    assert!(store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn cursors_are_persisted_and_replayed() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    google.return_cursor("tok-7");

    run_tick(&outlook, &google, &store).await;

    assert_eq!(
        store.get_cursor(CURSOR_GOOGLE_SYNC_TOKEN).await.unwrap(),
        Some("tok-7".to_string())
    );
    assert!(store
        .get_cursor(CURSOR_LAST_OUTLOOK_SCAN_AT)
        .await
        .unwrap()
        .is_some());

    run_tick(&outlook, &google, &store).await;

    // First tick starts with no token, second replays the stored one.
    assert_eq!(
        google.cursors_seen(),
        vec![None, Some("tok-7".to_string())]
    );
    // Outlook never gets a cursor.
    assert_eq!(outlook.cursors_seen(), vec![None, None]);
}

#[tokio::test]
async fn events_outside_the_window_are_invisible() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    // Decades outside any default window, even though the adapter returned
    // it: the engine must not mirror it or reason about its absence.
    let mut ancient = source_raw("O1", "Ancient", None);
    ancient.start = Some(RawTime::Instant(
        Utc.with_ymd_and_hms(1990, 1, 1, 9, 0, 0).unwrap(),
    ));
    ancient.end = Some(RawTime::Instant(
        Utc.with_ymd_and_hms(1990, 1, 1, 10, 0, 0).unwrap(),
    ));
    outlook.insert(ancient);

    let engine = Engine::new(
        &outlook,
        &google,
        &store,
        SyncWindow::default(),
        RedactionMode::None,
    );
    let summary = engine.tick(&CancellationToken::new()).await.expect("tick");

    assert_eq!(summary.scanned_outlook, 1);
    assert_eq!(summary.outlook_src, 0);
    assert_eq!(summary.created_google, 0);
    assert_eq!(google.len(), 0);
}

#[tokio::test]
async fn user_deleted_mirror_is_recreated() {
    let outlook = MockCalendar::new(Origin::Outlook);
    let google = MockCalendar::new(Origin::Google);
    let store = MappingStore::open_in_memory().await.unwrap();

    outlook.insert(source_raw("O1", "Planning", Some(t(8, 0))));
    run_tick(&outlook, &google, &store).await;
    let old_id = store.get_by_outlook("O1").await.unwrap().unwrap().google_id;

    google.remove(&old_id);

    let summary = run_tick(&outlook, &google, &store).await;

    assert_eq!(summary.created_google, 1);
    let row = store.get_by_outlook("O1").await.unwrap().unwrap();
    assert_ne!(row.google_id, old_id);
    assert!(google.get(&row.google_id).is_some());
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}
