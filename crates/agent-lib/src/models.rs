//! Core data models for the speedtest agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client identity reported by the measurement service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip: String,
    pub lat: f64,
    pub lon: f64,
    pub isp: String,
    #[serde(default)]
    pub isprating: f64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub ispdlavg: f64,
    #[serde(default)]
    pub ispulavg: f64,
    #[serde(default)]
    pub loggedin: i64,
    #[serde(default)]
    pub country: String,
}

/// A measurement server candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: u64,
    pub host: String,
    pub url: String,
    pub name: String,
    pub country: String,
    pub cc: String,
    #[serde(default)]
    pub sponsor: String,
    pub lat: f64,
    pub lon: f64,
    /// Great-circle distance from the client, in kilometers.
    #[serde(default)]
    pub distance: f64,
    /// Ping latency in milliseconds, filled in during server selection.
    #[serde(default)]
    pub latency: f64,
}

/// Byte and throughput totals for one transfer phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferStats {
    /// Measured throughput in bits per second.
    pub bits_per_second: f64,
    /// Total payload bytes moved during the phase.
    pub bytes_transferred: u64,
}

/// Raw output of one measurement session.
///
/// Produced once per successful cycle and consumed by the record builder;
/// nothing holds on to it past the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub client: ClientInfo,
    pub server: ServerInfo,
    /// Download throughput in bits per second.
    pub download: f64,
    /// Upload throughput in bits per second.
    pub upload: f64,
    /// Round-trip latency to the chosen server, in milliseconds.
    pub ping: f64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub timestamp: DateTime<Utc>,
    /// Sharing/reference token, when the provider issued one.
    pub share: Option<String>,
}
