//! Cycle scheduling
//!
//! A single sequential loop: run a cycle, sleep the cadence, repeat. The
//! scheduler never escalates a cycle failure; the only way out of an
//! unbounded run is process termination.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use crate::cycle::CycleOutcome;

/// Drives the cycle controller once, forever, or a bounded number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduler {
    cadence: Duration,
    limit: Option<u64>,
}

impl Scheduler {
    /// Run exactly one cycle and return (interactive mode).
    pub fn once() -> Self {
        Self {
            cadence: Duration::ZERO,
            limit: Some(1),
        }
    }

    /// Run forever with the given inter-cycle delay.
    pub fn forever(cadence: Duration) -> Self {
        Self {
            cadence,
            limit: None,
        }
    }

    /// Run a fixed number of cycles with the given delay between them.
    pub fn bounded(cadence: Duration, cycles: u64) -> Self {
        Self {
            cadence,
            limit: Some(cycles),
        }
    }

    /// Run cycles until the configured limit is reached.
    ///
    /// Sleeps only between cycles, so a single-cycle run never sleeps.
    /// Outcomes are logged and absorbed; two cycles never overlap.
    pub async fn run<F, Fut>(&self, mut cycle: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CycleOutcome>,
    {
        if self.limit == Some(0) {
            return;
        }

        info!(
            cadence_secs = self.cadence.as_secs(),
            limit = ?self.limit,
            "scheduler started"
        );

        let mut completed: u64 = 0;
        loop {
            let outcome = cycle().await;
            completed += 1;
            match outcome {
                CycleOutcome::Published => {
                    debug!(cycle = completed, "cycle published a record")
                }
                CycleOutcome::Failed(kind) => {
                    debug!(cycle = completed, kind = %kind, "cycle failed, continuing")
                }
            }

            if let Some(limit) = self.limit {
                if completed >= limit {
                    break;
                }
            }
            tokio::time::sleep(self.cadence).await;
        }

        info!(cycles = completed, "scheduler finished");
    }
}
