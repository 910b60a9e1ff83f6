//! The reconciliation engine: one tick end to end.
//!
//! Per tick: enumerate both sides, normalize, classify by marker, pair
//! sources to mirrors (mapping-first, then marker cross-lookup), decide a
//! per-pair action, then execute deletes → updates → creates. That ordering
//! keeps an interrupted tick safe: surviving state is always a subset of
//! intended state. Mapping mutations commit once per phase.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{CalendarAdapter, EventPage};
use crate::config::RedactionMode;
use crate::error::{BridgeCalError, BridgeCalResult};
use crate::event::{CanonicalEvent, Origin};
use crate::fingerprint::{self, equals_for_sync};
use crate::normalize::{normalize, RawEvent};
use crate::store::{
    MappingStore, PairRow, CURSOR_GOOGLE_SYNC_TOKEN, CURSOR_LAST_OUTLOOK_SCAN_AT,
};
use crate::sync::classify::SideSnapshot;
use crate::sync::decide::{decide, PairAction, PairFacts, StoredFingerprints};
use crate::sync::summary::TickSummary;
use crate::window::SyncWindow;

/// Reconciliation engine for one Outlook/Google pairing.
pub struct Engine<'a> {
    outlook: &'a dyn CalendarAdapter,
    google: &'a dyn CalendarAdapter,
    store: &'a MappingStore,
    window: SyncWindow,
    redaction: RedactionMode,
}

struct PlannedDelete {
    side: Origin,
    mirror_id: String,
    /// `None` for orphaned mirrors no row claims.
    row: Option<PairRow>,
}

struct PlannedUpdate {
    side: Origin,
    target_id: String,
    payload: CanonicalEvent,
    /// Row state to persist after the write succeeds.
    row: PairRow,
    /// `false` when the calendar is already in the intended state and only
    /// the row needs repair.
    write: bool,
}

struct PlannedCreate {
    side: Origin,
    payload: CanonicalEvent,
    payload_fingerprint: u64,
    source_side: Origin,
    source_id: String,
    source_fingerprint: u64,
    source_modified: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct TickPlan {
    deletes: Vec<PlannedDelete>,
    updates: Vec<PlannedUpdate>,
    creates: Vec<PlannedCreate>,
}

impl<'a> Engine<'a> {
    pub fn new(
        outlook: &'a dyn CalendarAdapter,
        google: &'a dyn CalendarAdapter,
        store: &'a MappingStore,
        window: SyncWindow,
        redaction: RedactionMode,
    ) -> Self {
        Engine {
            outlook,
            google,
            store,
            window,
            redaction,
        }
    }

    fn adapter_for(&self, side: Origin) -> &dyn CalendarAdapter {
        match side {
            Origin::Outlook => self.outlook,
            Origin::Google => self.google,
        }
    }

    /// Run one reconciliation pass. Cancellation is observed between adapter
    /// operations; a cancelled tick returns whatever it committed so far.
    pub async fn tick(&self, cancel: &CancellationToken) -> BridgeCalResult<TickSummary> {
        let mut summary = TickSummary::default();
        if cancel.is_cancelled() {
            return Ok(summary);
        }

        let now = Utc::now();
        let (from, to) = self.window.bounds(now);

        // A failed listing is fatal for the tick: reconciling against half a
        // picture would misread absence as deletion.
        let google_cursor = self.store.get_cursor(CURSOR_GOOGLE_SYNC_TOKEN).await?;
        let outlook_page = self.list_side(Origin::Outlook, from, to, None).await?;
        if cancel.is_cancelled() {
            return Ok(summary);
        }
        let google_page = self.list_side(Origin::Google, from, to, google_cursor).await?;

        summary.scanned_outlook = outlook_page.events.len() as u32;
        summary.scanned_google = google_page.events.len() as u32;

        let outlook = SideSnapshot::collect(
            self.clip_to_window(normalize_all(outlook_page.events, Origin::Outlook), now),
        );
        let google = SideSnapshot::collect(
            self.clip_to_window(normalize_all(google_page.events, Origin::Google), now),
        );

        summary.outlook_src = outlook.sources.len() as u32;
        summary.outlook_mirror = outlook.mirrors.len() as u32;
        summary.google_src = google.sources.len() as u32;
        summary.google_mirror = google.mirrors.len() as u32;

        let rows = self.store.list_all().await?;
        let plan = self.plan(&outlook, &google, &rows, now, &mut summary);

        self.execute_deletes(&plan.deletes, cancel, &mut summary).await?;
        self.execute_updates(&plan.updates, cancel, &mut summary).await?;
        self.execute_creates(&plan.creates, now, cancel, &mut summary).await?;

        // Cursors land only when the tick ran to completion.
        if !cancel.is_cancelled() {
            let mut tx = self.store.begin().await?;
            if let Some(token) = google_page.cursor {
                tx.set_cursor(CURSOR_GOOGLE_SYNC_TOKEN, &token).await?;
            }
            tx.set_cursor(CURSOR_LAST_OUTLOOK_SCAN_AT, &now.to_rfc3339()).await?;
            tx.commit().await?;
        }

        info!(
            scanned_outlook = summary.scanned_outlook,
            scanned_google = summary.scanned_google,
            created = summary.created_outlook + summary.created_google,
            updated = summary.updated_outlook + summary.updated_google,
            deleted = summary.deleted_outlook + summary.deleted_google,
            conflicts = summary.conflicts,
            errors = summary.errors,
            "tick complete"
        );

        Ok(summary)
    }

    async fn list_side(
        &self,
        side: Origin,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cursor: Option<String>,
    ) -> BridgeCalResult<EventPage> {
        self.adapter_for(side)
            .list_window(from, to, cursor)
            .await
            .map_err(|source| BridgeCalError::Adapter { side, source })
    }

    /// Window filtering is the adapters' job, but an over-wide page must not
    /// leak into absence reasoning: anything outside the window is invisible
    /// to reconciliation.
    fn clip_to_window(
        &self,
        events: Vec<CanonicalEvent>,
        now: DateTime<Utc>,
    ) -> Vec<CanonicalEvent> {
        events
            .into_iter()
            .filter(|event| {
                let keep = self.window.contains(event, now);
                if !keep {
                    debug!(side = %event.origin, id = %event.source_id, "event outside window, ignoring");
                }
                keep
            })
            .collect()
    }

    /// Build the tick plan. Pure with respect to the adapters: only the
    /// snapshots, the mapping rows and the clock feed it.
    fn plan(
        &self,
        outlook: &SideSnapshot,
        google: &SideSnapshot,
        rows: &[PairRow],
        now: DateTime<Utc>,
        summary: &mut TickSummary,
    ) -> TickPlan {
        let mut plan = TickPlan::default();

        let rows_by_outlook: HashMap<&str, usize> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.outlook_id.as_str(), i))
            .collect();
        let rows_by_google: HashMap<&str, usize> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.google_id.as_str(), i))
            .collect();

        let mut consumed_rows: HashSet<usize> = HashSet::new();
        let mut claimed_mirrors: HashSet<(Origin, String)> = HashSet::new();

        // Outlook sources first, then Google: deterministic when a row is
        // reachable from both sides (marker stripped by a user).
        for side in [Origin::Outlook, Origin::Google] {
            let (snapshot, other, rows_by_id) = match side {
                Origin::Outlook => (outlook, google, &rows_by_outlook),
                Origin::Google => (google, outlook, &rows_by_google),
            };

            let mut source_ids: Vec<&String> = snapshot.sources.keys().collect();
            source_ids.sort();

            for source_id in source_ids {
                let source = &snapshot.sources[source_id];

                // Rule a: mapping-first.
                if let Some(&idx) = rows_by_id.get(source_id.as_str()) {
                    if !consumed_rows.insert(idx) {
                        continue;
                    }
                    let row = &rows[idx];
                    let mirror_id = row.id_on(side.opposite());
                    let mirror = other.mirrors.get(mirror_id);
                    if mirror.is_some() {
                        claimed_mirrors.insert((side.opposite(), mirror_id.to_string()));
                    }
                    self.plan_pair(side, source, mirror, Some(row.clone()), now, &mut plan, summary);
                    continue;
                }

                // Rule b: marker-aware cross-lookup repairs lost state.
                if let Some(mirror_id) = other.mirror_by_source_ref.get(source_id.as_str()) {
                    if let Some(mirror) = other.mirrors.get(mirror_id) {
                        let marker_matches = mirror
                            .mirror_marker
                            .as_ref()
                            .is_some_and(|m| m.origin_of_source == side);
                        if marker_matches {
                            claimed_mirrors.insert((side.opposite(), mirror_id.clone()));
                            self.plan_pair(side, source, Some(mirror), None, now, &mut plan, summary);
                            continue;
                        }
                    }
                }

                // Rule c: unmatched sources are new. No bootstrap heuristics.
                self.plan_pair(side, source, None, None, now, &mut plan, summary);
            }
        }

        // Rows not reachable from any live source: if the mirror side is
        // still enumerated, the source is gone and the mirror follows it.
        // Invisible on both sides means the window slid past the pair; the
        // row stays inert until it returns.
        for (idx, row) in rows.iter().enumerate() {
            if consumed_rows.contains(&idx) {
                continue;
            }
            let mirror_side = row.origin.opposite();
            let mirror_id = row.id_on(mirror_side);
            let snapshot = match mirror_side {
                Origin::Outlook => outlook,
                Origin::Google => google,
            };
            if snapshot.mirrors.contains_key(mirror_id) {
                claimed_mirrors.insert((mirror_side, mirror_id.to_string()));
                plan.deletes.push(PlannedDelete {
                    side: mirror_side,
                    mirror_id: mirror_id.to_string(),
                    row: Some(row.clone()),
                });
            }
        }

        // Orphaned mirrors: marker-bearing items neither the pairing pass
        // nor any row claimed. Their source is gone, or another mirror
        // already serves it (duplicate left by a crash between create and
        // row commit). Deleting them is what keeps a lost store from leaking
        // stale mirrors forever.
        for (side, snapshot, rows_by_id) in [
            (Origin::Outlook, outlook, &rows_by_outlook),
            (Origin::Google, google, &rows_by_google),
        ] {
            let mut mirror_ids: Vec<&String> = snapshot.mirrors.keys().collect();
            mirror_ids.sort();

            for mirror_id in mirror_ids {
                if claimed_mirrors.contains(&(side, mirror_id.clone())) {
                    continue;
                }
                if rows_by_id.contains_key(mirror_id.as_str()) {
                    // A row references this id in an inconsistent role; leave
                    // it for the operator rather than guessing.
                    continue;
                }
                plan.deletes.push(PlannedDelete {
                    side,
                    mirror_id: mirror_id.clone(),
                    row: None,
                });
            }
        }

        plan
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_pair(
        &self,
        source_side: Origin,
        source: &CanonicalEvent,
        mirror: Option<&CanonicalEvent>,
        row: Option<PairRow>,
        now: DateTime<Utc>,
        plan: &mut TickPlan,
        summary: &mut TickSummary,
    ) {
        let mirror_side = source_side.opposite();
        let payload = source.mirror_payload(self.redaction);
        let source_fp = fingerprint::fingerprint(source);
        let expected_fp = fingerprint::fingerprint(&payload);

        let facts = PairFacts {
            source_side,
            source_fingerprint: source_fp,
            mirror_fingerprint: mirror.map(fingerprint::fingerprint),
            expected_mirror_fingerprint: expected_fp,
            stored: row.as_ref().map(|r| StoredFingerprints {
                source: r.fingerprint_on(source_side),
                mirror: r.fingerprint_on(mirror_side),
            }),
            source_modified: source.last_modified,
            mirror_modified: mirror.and_then(|m| m.last_modified),
        };

        let decision = decide(&facts);
        if decision.conflict {
            summary.conflicts += 1;
            // Both ids and both timestamps; contents stay out of the log.
            info!(
                source_side = %source_side,
                source_id = %source.source_id,
                mirror_id = mirror.map(|m| m.source_id.as_str()).unwrap_or(""),
                source_modified = ?facts.source_modified,
                mirror_modified = ?facts.mirror_modified,
                resolution = ?decision.action,
                "conflict resolved by last-write-wins"
            );
        }

        match decision.action {
            PairAction::Noop => {
                if row.is_none() {
                    if let Some(mirror) = mirror {
                        // Marker-recovered pair already in sync: re-adopt it
                        // by writing the row back, no calendar write needed.
                        let row = fresh_row(source_side, source, mirror, source_fp, expected_fp, now);
                        plan.updates.push(PlannedUpdate {
                            side: mirror_side,
                            target_id: mirror.source_id.clone(),
                            payload,
                            row,
                            write: false,
                        });
                    }
                }
            }
            PairAction::CreateMirror => {
                plan.creates.push(PlannedCreate {
                    side: mirror_side,
                    payload,
                    payload_fingerprint: expected_fp,
                    source_side,
                    source_id: source.source_id.clone(),
                    source_fingerprint: source_fp,
                    source_modified: source.last_modified,
                });
            }
            PairAction::UpdateMirror => {
                let Some(mirror) = mirror else { return };
                let mirror_fp = fingerprint::fingerprint(mirror);
                // Defensive re-check: skip the calendar write when the live
                // mirror already carries the expected payload.
                let write = !(mirror_fp == expected_fp && equals_for_sync(mirror, &payload));

                let row = match row {
                    Some(mut r) => {
                        r.set_fingerprint_on(source_side, Some(source_fp));
                        r.set_fingerprint_on(mirror_side, Some(expected_fp));
                        r.set_last_modified_on(source_side, source.last_modified);
                        r.set_last_modified_on(mirror_side, mirror.last_modified);
                        r.updated_at = now;
                        r
                    }
                    None => fresh_row(source_side, source, mirror, source_fp, expected_fp, now),
                };

                plan.updates.push(PlannedUpdate {
                    side: mirror_side,
                    target_id: mirror.source_id.clone(),
                    payload,
                    row,
                    write,
                });
            }
            PairAction::UpdateSource => {
                let Some(mirror) = mirror else { return };
                // The mirror won: its content flows back to the source,
                // marker-free. Content fingerprints now agree on both sides.
                let mut back = mirror.clone();
                back.origin = source_side;
                back.source_id = String::new();
                back.mirror_marker = None;
                back.last_modified = None;
                let mirror_fp = fingerprint::fingerprint(mirror);

                let row = match row {
                    Some(mut r) => {
                        r.set_fingerprint_on(source_side, Some(mirror_fp));
                        r.set_fingerprint_on(mirror_side, Some(mirror_fp));
                        r.set_last_modified_on(source_side, source.last_modified);
                        r.set_last_modified_on(mirror_side, mirror.last_modified);
                        r.updated_at = now;
                        r
                    }
                    None => fresh_row(source_side, source, mirror, mirror_fp, mirror_fp, now),
                };

                plan.updates.push(PlannedUpdate {
                    side: source_side,
                    target_id: source.source_id.clone(),
                    payload: back,
                    row,
                    write: true,
                });
            }
        }
    }

    async fn execute_deletes(
        &self,
        deletes: &[PlannedDelete],
        cancel: &CancellationToken,
        summary: &mut TickSummary,
    ) -> BridgeCalResult<()> {
        if deletes.is_empty() {
            return Ok(());
        }

        let mut tx = self.store.begin().await?;
        for op in deletes {
            if cancel.is_cancelled() {
                break;
            }
            match self.adapter_for(op.side).delete(&op.mirror_id).await {
                Ok(()) => {
                    count_delete(summary, op.side);
                    if let Some(row) = &op.row {
                        tx.delete(row).await?;
                    }
                    debug!(side = %op.side, id = %op.mirror_id, "mirror deleted");
                }
                Err(err) if err.is_fatal() => {
                    tx.commit().await?;
                    return Err(BridgeCalError::Adapter {
                        side: op.side,
                        source: err,
                    });
                }
                Err(err) => {
                    summary.errors += 1;
                    warn!(side = %op.side, id = %op.mirror_id, %err, "delete failed, continuing");
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn execute_updates(
        &self,
        updates: &[PlannedUpdate],
        cancel: &CancellationToken,
        summary: &mut TickSummary,
    ) -> BridgeCalResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut tx = self.store.begin().await?;
        for op in updates {
            if cancel.is_cancelled() {
                break;
            }
            if !op.write {
                tx.upsert(&op.row).await?;
                continue;
            }
            match self
                .adapter_for(op.side)
                .update(&op.target_id, &op.payload)
                .await
            {
                Ok(()) => {
                    count_update(summary, op.side);
                    tx.upsert(&op.row).await?;
                    debug!(side = %op.side, id = %op.target_id, "event updated");
                }
                Err(err) if err.is_fatal() => {
                    tx.commit().await?;
                    return Err(BridgeCalError::Adapter {
                        side: op.side,
                        source: err,
                    });
                }
                Err(err) => {
                    summary.errors += 1;
                    warn!(side = %op.side, id = %op.target_id, %err, "update failed, continuing");
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn execute_creates(
        &self,
        creates: &[PlannedCreate],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        summary: &mut TickSummary,
    ) -> BridgeCalResult<()> {
        if creates.is_empty() {
            return Ok(());
        }

        let mut tx = self.store.begin().await?;
        for op in creates {
            if cancel.is_cancelled() {
                break;
            }
            match self.adapter_for(op.side).create(&op.payload).await {
                Ok(new_id) => {
                    count_create(summary, op.side);
                    let (outlook_id, google_id) = match op.source_side {
                        Origin::Outlook => (op.source_id.clone(), new_id),
                        Origin::Google => (new_id, op.source_id.clone()),
                    };
                    let mut row = PairRow {
                        outlook_id,
                        google_id,
                        origin: op.source_side,
                        last_outlook_modified: None,
                        last_google_modified: None,
                        last_outlook_fingerprint: None,
                        last_google_fingerprint: None,
                        created_at: now,
                        updated_at: now,
                    };
                    row.set_fingerprint_on(op.source_side, Some(op.source_fingerprint));
                    row.set_fingerprint_on(op.side, Some(op.payload_fingerprint));
                    row.set_last_modified_on(op.source_side, op.source_modified);
                    tx.upsert(&row).await?;
                    debug!(side = %op.side, source_id = %op.source_id, "mirror created");
                }
                Err(err) if err.is_fatal() => {
                    tx.commit().await?;
                    return Err(BridgeCalError::Adapter {
                        side: op.side,
                        source: err,
                    });
                }
                Err(err) => {
                    summary.errors += 1;
                    warn!(side = %op.side, source_id = %op.source_id, %err, "create failed, continuing");
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

fn normalize_all(raws: Vec<RawEvent>, side: Origin) -> Vec<CanonicalEvent> {
    raws.into_iter()
        .filter_map(|raw| match normalize(raw, side) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(side = %side, %err, "skipping malformed event");
                None
            }
        })
        .collect()
}

fn fresh_row(
    source_side: Origin,
    source: &CanonicalEvent,
    mirror: &CanonicalEvent,
    source_fp: u64,
    mirror_fp: u64,
    now: DateTime<Utc>,
) -> PairRow {
    let (outlook_id, google_id) = match source_side {
        Origin::Outlook => (source.source_id.clone(), mirror.source_id.clone()),
        Origin::Google => (mirror.source_id.clone(), source.source_id.clone()),
    };

    let mut row = PairRow {
        outlook_id,
        google_id,
        origin: source_side,
        last_outlook_modified: None,
        last_google_modified: None,
        last_outlook_fingerprint: None,
        last_google_fingerprint: None,
        created_at: now,
        updated_at: now,
    };
    row.set_fingerprint_on(source_side, Some(source_fp));
    row.set_fingerprint_on(source_side.opposite(), Some(mirror_fp));
    row.set_last_modified_on(source_side, source.last_modified);
    row.set_last_modified_on(source_side.opposite(), mirror.last_modified);
    row
}

fn count_create(summary: &mut TickSummary, side: Origin) {
    match side {
        Origin::Outlook => summary.created_outlook += 1,
        Origin::Google => summary.created_google += 1,
    }
}

fn count_update(summary: &mut TickSummary, side: Origin) {
    match side {
        Origin::Outlook => summary.updated_outlook += 1,
        Origin::Google => summary.updated_google += 1,
    }
}

fn count_delete(summary: &mut TickSummary, side: Origin) {
    match side {
        Origin::Outlook => summary.deleted_outlook += 1,
        Origin::Google => summary.deleted_google += 1,
    }
}
