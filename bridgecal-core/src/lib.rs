//! Reconciliation core for BridgeCal.
//!
//! This crate provides:
//! - Canonical event types (`CanonicalEvent`, `EventTime`, `MirrorMarker`)
//! - Fingerprint-based change detection
//! - The durable mapping store (pair rows + cursors)
//! - The calendar adapter contract and the subprocess provider client
//! - The reconciliation engine and tick driver

pub mod adapter;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod normalize;
pub mod store;
pub mod sync;
pub mod window;

// Re-export commonly used types at crate root
pub use error::{BridgeCalError, BridgeCalResult};
pub use event::*;
pub use sync::{Engine, TickSummary};
