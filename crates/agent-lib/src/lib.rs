//! Speedtest agent library
//!
//! This crate provides the core functionality for:
//! - Scheduled throughput/latency measurements against a speedtest service
//! - Building tagged, timestamped storage records from raw results
//! - Publishing record batches to InfluxDB
//! - Containing per-cycle failures so one bad cycle costs one data point
//!
//! The measurement provider and the storage sink are injected capabilities;
//! production implementations speak HTTP, tests substitute deterministic
//! fakes.

pub mod cadence;
pub mod config;
pub mod cycle;
pub mod dump;
pub mod error;
pub mod models;
pub mod record;
pub mod scheduler;
pub mod speedtest;
pub mod storage;

#[cfg(test)]
pub(crate) mod testutil;

pub use cadence::parse_cadence;
pub use config::Settings;
pub use cycle::{CycleOutcome, CycleRunner, OutputOptions};
pub use error::{AgentError, FailureKind};
pub use models::*;
pub use scheduler::Scheduler;
