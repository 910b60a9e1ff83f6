//! Marker-based classification of enumerated events.

use std::collections::HashMap;

use crate::event::CanonicalEvent;

/// One side's normalized window population, partitioned into sources and
/// mirrors.
#[derive(Debug, Default)]
pub struct SideSnapshot {
    /// Human-authored originals, by native id.
    pub sources: HashMap<String, CanonicalEvent>,
    /// BridgeCal-authored mirrors, by native id.
    pub mirrors: HashMap<String, CanonicalEvent>,
    /// Mirror native id keyed by the source id its marker references.
    pub mirror_by_source_ref: HashMap<String, String>,
}

impl SideSnapshot {
    /// Partition a side's events. An event carrying a marker is a mirror and
    /// is never treated as a source; this alone prevents mirror loops.
    pub fn collect(events: Vec<CanonicalEvent>) -> SideSnapshot {
        let mut snapshot = SideSnapshot::default();

        for event in events {
            match &event.mirror_marker {
                Some(marker) => {
                    snapshot
                        .mirror_by_source_ref
                        .insert(marker.source_id.clone(), event.source_id.clone());
                    snapshot.mirrors.insert(event.source_id.clone(), event);
                }
                None => {
                    snapshot.sources.insert(event.source_id.clone(), event);
                }
            }
        }

        snapshot
    }
}
