//! Per-tick counters.

use std::fmt;

use serde::Serialize;

use crate::error::exit;

/// Summary of one reconciliation tick. Event content never appears here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub scanned_outlook: u32,
    pub scanned_google: u32,
    pub outlook_src: u32,
    pub outlook_mirror: u32,
    pub google_src: u32,
    pub google_mirror: u32,
    pub created_outlook: u32,
    pub created_google: u32,
    pub updated_outlook: u32,
    pub updated_google: u32,
    pub deleted_outlook: u32,
    pub deleted_google: u32,
    pub conflicts: u32,
    pub errors: u32,
}

impl TickSummary {
    /// Total writes executed this tick.
    pub fn writes(&self) -> u32 {
        self.created_outlook
            + self.created_google
            + self.updated_outlook
            + self.updated_google
            + self.deleted_outlook
            + self.deleted_google
    }

    /// Exit code for a single-tick run: transient failures only matter when
    /// the tick achieved nothing at all.
    pub fn exit_code(&self) -> i32 {
        if self.errors > 0 && self.writes() == 0 {
            exit::RUNTIME
        } else {
            exit::OK
        }
    }
}

impl fmt::Display for TickSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned outlook {} ({} src, {} mirror), google {} ({} src, {} mirror); \
             created {}/{}, updated {}/{}, deleted {}/{} (outlook/google); \
             {} conflicts, {} errors",
            self.scanned_outlook,
            self.outlook_src,
            self.outlook_mirror,
            self.scanned_google,
            self.google_src,
            self.google_mirror,
            self.created_outlook,
            self.created_google,
            self.updated_outlook,
            self.updated_google,
            self.deleted_outlook,
            self.deleted_google,
            self.conflicts,
            self.errors,
        )
    }
}
