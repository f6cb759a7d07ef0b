//! One measurement cycle
//!
//! The controller walks Idle → Measuring → Building → Publishing → Done,
//! absorbing any failure into a classified outcome. A failed cycle costs
//! one missed data point, nothing more; nothing but the outcome crosses
//! this boundary.

use std::error::Error as _;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::SpeedtestConfig;
use crate::dump;
use crate::error::{AgentError, FailureKind};
use crate::record;
use crate::speedtest::{self, SpeedtestProvider};
use crate::storage::RecordSink;

/// Terminal result of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The record was published.
    Published,
    /// The cycle failed; the kind says where.
    Failed(FailureKind),
}

/// Raw-result dump options.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Write one JSON document per cycle with the unmodified result.
    pub dump_raw: bool,
    /// Directory receiving the dumps.
    pub directory: PathBuf,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dump_raw: false,
            directory: PathBuf::from("."),
        }
    }
}

/// Runs measurement cycles against an injected provider and sink.
pub struct CycleRunner {
    speedtest: SpeedtestConfig,
    output: OutputOptions,
    provider: Arc<dyn SpeedtestProvider>,
    sink: Arc<dyn RecordSink>,
}

impl CycleRunner {
    pub fn new(
        speedtest: SpeedtestConfig,
        output: OutputOptions,
        provider: Arc<dyn SpeedtestProvider>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            speedtest,
            output,
            provider,
            sink,
        }
    }

    /// Run one full cycle.
    ///
    /// Never returns an error: failures are logged with their kind and
    /// cause, then absorbed into the outcome.
    pub async fn run(&self) -> CycleOutcome {
        match self.execute().await {
            Ok(()) => {
                debug!(state = "done", "cycle complete");
                CycleOutcome::Published
            }
            Err(err) => {
                error!(
                    kind = %err.kind(),
                    error = %err,
                    cause = ?err.source(),
                    "measurement cycle failed"
                );
                CycleOutcome::Failed(err.kind())
            }
        }
    }

    async fn execute(&self) -> Result<(), AgentError> {
        debug!(state = "measuring", "starting measurement cycle");
        let result = speedtest::acquire(&self.speedtest, self.provider.as_ref()).await?;

        if self.output.dump_raw {
            match dump::write_raw_result(&self.output.directory, &result) {
                Ok(path) => debug!(path = %path.display(), "raw result written"),
                Err(err) => warn!(error = %err, "failed to write raw result"),
            }
        }

        debug!(state = "building", "building storage record");
        let record = record::build(&result);
        info!(
            download_bps = result.download,
            upload_bps = result.upload,
            ping_ms = result.ping,
            server_id = result.server.id,
            "measurement complete"
        );

        debug!(state = "publishing", "publishing record batch");
        self.sink.publish(std::slice::from_ref(&record)).await?;
        info!(records = 1, "record published");
        Ok(())
    }
}
