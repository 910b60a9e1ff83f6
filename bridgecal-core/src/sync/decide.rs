//! Per-pair action decision.
//!
//! Pure functions: given the pair's current fingerprints, the stored row
//! fingerprints and the two modification timestamps, the chosen action is
//! fully determined.

use chrono::{DateTime, Utc};

use crate::event::Origin;

/// What the engine should do for one (source, mirror) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairAction {
    /// Nothing changed on either side.
    Noop,
    /// Mirror missing: create it on the opposite side.
    CreateMirror,
    /// Bring the mirror in line with the source.
    UpdateMirror,
    /// Both sides changed and the mirror won: write its content back to the
    /// source. The mapping row's origin does not change.
    UpdateSource,
}

/// Stored fingerprints for the pair, when a mapping row exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredFingerprints {
    pub source: Option<u64>,
    pub mirror: Option<u64>,
}

/// Everything the decision depends on.
#[derive(Debug, Clone, Copy)]
pub struct PairFacts {
    /// Side the source event lives on.
    pub source_side: Origin,
    pub source_fingerprint: u64,
    /// Fingerprint of the live mirror; `None` when the mirror is absent.
    pub mirror_fingerprint: Option<u64>,
    /// Fingerprint the mirror is expected to carry (the source's payload).
    pub expected_mirror_fingerprint: u64,
    /// `None` when no mapping row exists (pair recovered via marker).
    pub stored: Option<StoredFingerprints>,
    pub source_modified: Option<DateTime<Utc>>,
    pub mirror_modified: Option<DateTime<Utc>>,
}

/// Decision plus whether it was reached through conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: PairAction,
    pub conflict: bool,
}

impl Decision {
    fn plain(action: PairAction) -> Decision {
        Decision {
            action,
            conflict: false,
        }
    }
}

/// Apply the action table to one pair.
pub fn decide(facts: &PairFacts) -> Decision {
    let Some(mirror_fingerprint) = facts.mirror_fingerprint else {
        return Decision::plain(PairAction::CreateMirror);
    };

    let Some(stored) = facts.stored else {
        // Pair recovered by marker cross-lookup: no stored revisions to
        // compare against, so fall back to the content itself.
        return if mirror_fingerprint == facts.expected_mirror_fingerprint {
            Decision::plain(PairAction::Noop)
        } else {
            Decision::plain(PairAction::UpdateMirror)
        };
    };

    // A stored fingerprint of None counts as unchanged (first observation).
    let source_changed = stored.source.is_some_and(|f| f != facts.source_fingerprint);
    let mirror_changed = stored.mirror.is_some_and(|f| f != mirror_fingerprint);

    match (source_changed, mirror_changed) {
        (false, false) => Decision::plain(PairAction::Noop),
        (true, false) => Decision::plain(PairAction::UpdateMirror),
        // The source is authoritative outside conflicts: overwrite the edit.
        (false, true) => Decision::plain(PairAction::UpdateMirror),
        (true, true) => Decision {
            action: resolve_conflict(facts),
            conflict: true,
        },
    }
}

/// Last-write-wins; a missing or equal timestamp falls to the copy living on
/// Outlook.
fn resolve_conflict(facts: &PairFacts) -> PairAction {
    match (facts.source_modified, facts.mirror_modified) {
        (Some(source), Some(mirror)) if mirror > source => PairAction::UpdateSource,
        (Some(source), Some(mirror)) if source > mirror => PairAction::UpdateMirror,
        _ => {
            if facts.source_side == Origin::Outlook {
                PairAction::UpdateMirror
            } else {
                PairAction::UpdateSource
            }
        }
    }
}
