//! Tick scheduling.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{exit, BridgeCalResult};
use crate::sync::{Engine, TickSummary};

/// Runs single ticks or a fixed-interval loop.
///
/// At most one tick per process is ever in flight; a tick in flight always
/// runs to a checkpoint before the driver returns.
pub struct TickDriver<'a> {
    engine: Engine<'a>,
}

impl<'a> TickDriver<'a> {
    pub fn new(engine: Engine<'a>) -> Self {
        TickDriver { engine }
    }

    /// One reconciliation tick.
    pub async fn run_once(&self, cancel: &CancellationToken) -> BridgeCalResult<TickSummary> {
        self.engine.tick(cancel).await
    }

    /// Tick, sleep, repeat. Cancellation during the sleep is immediate.
    pub async fn run_loop(
        &self,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> BridgeCalResult<()> {
        loop {
            match self.run_once(cancel).await {
                Ok(summary) => {
                    if summary.errors > 0 {
                        info!(errors = summary.errors, "tick finished with transient errors");
                    }
                }
                Err(err) => {
                    // Config and auth failures will not heal on their own.
                    if err.exit_code() != exit::RUNTIME {
                        return Err(err);
                    }
                    error!(%err, "tick failed, retrying next interval");
                }
            }

            if cancel.is_cancelled() {
                return Ok(());
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}
