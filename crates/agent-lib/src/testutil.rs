//! Shared test fixtures: canned measurement data and scripted fakes for
//! the provider and sink capabilities.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::models::{ClientInfo, MeasurementResult, ServerInfo, TransferStats};
use crate::record::Record;
use crate::speedtest::{ProviderError, SpeedtestProvider};
use crate::storage::{RecordSink, StorageError};

pub(crate) fn sample_client() -> ClientInfo {
    ClientInfo {
        ip: "198.51.100.23".to_string(),
        lat: 52.52,
        lon: 13.405,
        isp: "Example Telecom".to_string(),
        isprating: 3.7,
        rating: 0.0,
        ispdlavg: 88_000.0,
        ispulavg: 21_000.0,
        loggedin: 0,
        country: "DE".to_string(),
    }
}

pub(crate) fn sample_server() -> ServerInfo {
    ServerInfo {
        id: 4242,
        host: "speed.example.net:8080".to_string(),
        url: "http://speed.example.net:8080/speedtest/upload.php".to_string(),
        name: "Berlin".to_string(),
        country: "Germany".to_string(),
        cc: "DE".to_string(),
        sponsor: "Example Networks".to_string(),
        lat: 52.5,
        lon: 13.4,
        distance: 2.8,
        latency: 17.5,
    }
}

pub(crate) fn sample_result() -> MeasurementResult {
    MeasurementResult {
        client: sample_client(),
        server: sample_server(),
        download: 93_511_045.3,
        upload: 18_560_221.7,
        ping: 17.5,
        bytes_received: 116_888_807,
        bytes_sent: 23_200_276,
        timestamp: Utc.with_ymd_and_hms(2021, 3, 14, 9, 26, 53).unwrap(),
        share: None,
    }
}

/// Deterministic provider fake: serves a fixed server list and records the
/// order of capability calls. Failures are injected per method.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    pub servers: Vec<ServerInfo>,
    pub handshake_error: Option<String>,
    pub servers_error: Option<String>,
    pub download_error: Option<String>,
    pub upload_error: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn with_servers(servers: Vec<ServerInfo>) -> Self {
        Self {
            servers,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl SpeedtestProvider for ScriptedProvider {
    async fn handshake(&self) -> Result<ClientInfo, ProviderError> {
        self.record("handshake");
        match &self.handshake_error {
            Some(message) => Err(ProviderError::message(message.clone())),
            None => Ok(sample_client()),
        }
    }

    async fn servers(&self, restrict: &[u64]) -> Result<Vec<ServerInfo>, ProviderError> {
        self.record(format!("servers:{restrict:?}"));
        if let Some(message) = &self.servers_error {
            return Err(ProviderError::message(message.clone()));
        }
        if restrict.is_empty() {
            return Ok(self.servers.clone());
        }
        Ok(self
            .servers
            .iter()
            .filter(|server| restrict.contains(&server.id))
            .cloned()
            .collect())
    }

    async fn best_server(
        &self,
        _client: &ClientInfo,
        candidates: Vec<ServerInfo>,
    ) -> Result<ServerInfo, ProviderError> {
        self.record("best_server");
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::message("no candidates to rank"))
    }

    async fn download(
        &self,
        _server: &ServerInfo,
        _workers: usize,
    ) -> Result<TransferStats, ProviderError> {
        self.record("download");
        match &self.download_error {
            Some(message) => Err(ProviderError::message(message.clone())),
            None => Ok(TransferStats {
                bits_per_second: 93_511_045.3,
                bytes_transferred: 116_888_807,
            }),
        }
    }

    async fn upload(
        &self,
        _server: &ServerInfo,
        _workers: usize,
    ) -> Result<TransferStats, ProviderError> {
        self.record("upload");
        match &self.upload_error {
            Some(message) => Err(ProviderError::message(message.clone())),
            None => Ok(TransferStats {
                bits_per_second: 18_560_221.7,
                bytes_transferred: 23_200_276,
            }),
        }
    }
}

/// Sink fake: records every published batch, optionally failing the first
/// N publish calls to exercise partial-failure handling.
#[derive(Default)]
pub(crate) struct RecordingSink {
    published: Mutex<Vec<Vec<Record>>>,
    failures_remaining: AtomicUsize,
}

impl RecordingSink {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            failures_remaining: AtomicUsize::new(failures),
        }
    }

    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSink for RecordingSink {
    async fn publish(&self, records: &[Record]) -> Result<(), StorageError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Malformed {
                operation: "write points",
            });
        }
        self.published.lock().unwrap().push(records.to_vec());
        Ok(())
    }
}
