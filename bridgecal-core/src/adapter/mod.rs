//! The capability contract the engine demands of each calendar side.

pub mod protocol;
pub mod subprocess;

pub use subprocess::SubprocessAdapter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::{CanonicalEvent, Origin};
use crate::normalize::RawEvent;

/// Google mirror marker keys (extended-private event properties).
pub const GOOGLE_MARKER_ORIGIN: &str = "bridgecal.origin";
pub const GOOGLE_MARKER_OUTLOOK_ID: &str = "bridgecal.outlook_id";

/// Outlook mirror marker keys (user-defined appointment properties).
pub const OUTLOOK_MARKER_ORIGIN: &str = "BridgeCalOrigin";
pub const OUTLOOK_MARKER_GOOGLE_ID: &str = "BridgeCalGoogleId";

/// Faults an adapter can report.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Unrecoverable credential failure. Fatal for the process.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network trouble, rate limit, momentary COM unavailability. The engine
    /// logs, counts, and continues with the next item.
    #[error("transient failure ({kind}): {message}")]
    Transient { kind: String, message: String },

    #[error("provider '{0}' not found in PATH")]
    NotInstalled(String),

    #[error("provider request timed out after {0}s")]
    Timeout(u64),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    pub fn transient(kind: impl Into<String>, message: impl Into<String>) -> Self {
        AdapterError::Transient {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AdapterError::Auth(_))
    }

    /// Credential failures and a missing provider binary abort the tick;
    /// everything else is retried on a later tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AdapterError::Auth(_) | AdapterError::NotInstalled(_))
    }
}

/// One page of window enumeration.
#[derive(Debug, Clone)]
pub struct EventPage {
    pub events: Vec<RawEvent>,
    /// Replacement cursor for incremental listing, when the side supports it.
    pub cursor: Option<String>,
}

/// What the reconciliation core demands of each side.
///
/// `list_window` must return the complete window population even when a
/// cursor lets the adapter fetch incrementally: recurring series expanded to
/// per-instance entries, previously written marker fields included. Mirror
/// writes must land privately (Google: `visibility=private`,
/// `transparency=opaque`, `sendUpdates=none`; Outlook: `Sensitivity=private`,
/// `BusyStatus=busy`, never a meeting request) and must not send invitations
/// or notifications. Within one adapter, operations from one tick are
/// sequential.
#[async_trait]
pub trait CalendarAdapter: Send + Sync {
    /// Which platform this adapter fronts.
    fn origin(&self) -> Origin;

    /// Enumerate events overlapping `[from, to)`.
    async fn list_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cursor: Option<String>,
    ) -> Result<EventPage, AdapterError>;

    /// Create an event, writing the marker from `event.mirror_marker`.
    /// Returns the new native id.
    async fn create(&self, event: &CanonicalEvent) -> Result<String, AdapterError>;

    /// Update in place. The marker must be preserved.
    async fn update(&self, id: &str, event: &CanonicalEvent) -> Result<(), AdapterError>;

    /// Delete. A missing target is success.
    async fn delete(&self, id: &str) -> Result<(), AdapterError>;
}
