//! Reconciliation: classification, pairing, the per-pair action decision
//! and the tick engine.

pub mod classify;
pub mod decide;
pub mod engine;
pub mod summary;

pub use engine::Engine;
pub use summary::TickSummary;
