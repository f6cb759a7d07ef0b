//! HTTP implementation of the measurement provider
//!
//! Speaks a small JSON surface for session setup and server discovery, and
//! runs the transfer phases over plain HTTP. The wire details live entirely
//! inside this module; everything else sees the `SpeedtestProvider` trait.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::debug;
use url::Url;

use super::{ProviderError, SpeedtestProvider};
use crate::models::{ClientInfo, ServerInfo, TransferStats};

/// Request timeout for session setup and server discovery.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request timeout during transfer phases.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// How many of the closest candidates are latency-probed.
const PROBE_CANDIDATES: usize = 5;

/// Latency samples taken per probed server.
const PROBE_SAMPLES: u32 = 3;

/// Download payload sizes in bytes, fetched round-robin by the workers.
const DOWNLOAD_SIZES: &[u64] = &[245_388, 505_544, 1_118_012, 1_986_284, 4_468_241];

/// Upload payload sizes in bytes.
const UPLOAD_SIZES: &[usize] = &[131_072, 262_144, 524_288];

/// Requests each transfer worker issues per phase.
const REQUESTS_PER_WORKER: usize = 4;

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    client: ClientInfo,
}

/// Measurement provider speaking HTTP/JSON against a speedtest service.
pub struct HttpSpeedtestProvider {
    http: Client,
    transfer: Client,
    base_url: Url,
}

impl HttpSpeedtestProvider {
    /// Create a provider against the given service base URL.
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::new("failed to create HTTP client", e))?;
        let transfer = Client::builder()
            .timeout(TRANSFER_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::new("failed to create transfer client", e))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| ProviderError::new(format!("invalid provider base URL {base_url:?}"), e))?;
        Ok(Self {
            http,
            transfer,
            base_url,
        })
    }

    async fn fetch_json<T>(&self, path: &str) -> Result<T, ProviderError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ProviderError::new(format!("invalid provider path {path:?}"), e))?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("request to {url} failed"), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::message(format!(
                "request to {url} returned {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("malformed response from {url}"), e))
    }

    /// Average request latency against one server, in milliseconds.
    async fn probe_latency(&self, server: &ServerInfo) -> Result<f64, ProviderError> {
        let url = latency_url(server)?;
        let mut total = Duration::ZERO;
        for _ in 0..PROBE_SAMPLES {
            let start = Instant::now();
            let response = self
                .http
                .get(url.clone())
                .send()
                .await
                .map_err(|e| ProviderError::new(format!("latency probe to {url} failed"), e))?;
            response
                .bytes()
                .await
                .map_err(|e| ProviderError::new(format!("latency probe to {url} failed"), e))?;
            total += start.elapsed();
        }
        Ok(total.as_secs_f64() * 1_000.0 / f64::from(PROBE_SAMPLES))
    }
}

#[async_trait]
impl SpeedtestProvider for HttpSpeedtestProvider {
    async fn handshake(&self) -> Result<ClientInfo, ProviderError> {
        let document: ConfigDocument = self.fetch_json("api/js/config").await?;
        Ok(document.client)
    }

    async fn servers(&self, restrict: &[u64]) -> Result<Vec<ServerInfo>, ProviderError> {
        let mut servers: Vec<ServerInfo> = self.fetch_json("api/js/servers").await?;
        if !restrict.is_empty() {
            servers.retain(|server| restrict.contains(&server.id));
        }
        Ok(servers)
    }

    async fn best_server(
        &self,
        client: &ClientInfo,
        mut candidates: Vec<ServerInfo>,
    ) -> Result<ServerInfo, ProviderError> {
        for server in &mut candidates {
            server.distance = haversine_km(client.lat, client.lon, server.lat, server.lon);
        }
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        candidates.truncate(PROBE_CANDIDATES);

        let mut best: Option<ServerInfo> = None;
        for mut server in candidates {
            match self.probe_latency(&server).await {
                Ok(latency) => {
                    server.latency = latency;
                    if best.as_ref().map_or(true, |b| server.latency < b.latency) {
                        best = Some(server);
                    }
                }
                Err(e) => {
                    debug!(server_id = server.id, error = %e, "latency probe failed, skipping server")
                }
            }
        }
        best.ok_or_else(|| ProviderError::message("all latency probes failed"))
    }

    async fn download(
        &self,
        server: &ServerInfo,
        workers: usize,
    ) -> Result<TransferStats, ProviderError> {
        let base = server_url(server)?;
        let started = Instant::now();
        let mut tasks: JoinSet<Result<u64, ProviderError>> = JoinSet::new();

        for worker in 0..workers.max(1) {
            let client = self.transfer.clone();
            let base = base.clone();
            tasks.spawn(async move {
                let mut bytes = 0u64;
                for request in 0..REQUESTS_PER_WORKER {
                    let size = DOWNLOAD_SIZES[(worker + request) % DOWNLOAD_SIZES.len()];
                    let url = base
                        .join(&format!("download?size={size}"))
                        .map_err(|e| ProviderError::new("invalid download URL", e))?;
                    let response = client.get(url.clone()).send().await.map_err(|e| {
                        ProviderError::new(format!("download request to {url} failed"), e)
                    })?;
                    let body = response.bytes().await.map_err(|e| {
                        ProviderError::new(format!("download request to {url} failed"), e)
                    })?;
                    bytes += body.len() as u64;
                }
                Ok(bytes)
            });
        }

        let total = drain(&mut tasks, "download").await?;
        Ok(stats(total, started.elapsed()))
    }

    async fn upload(
        &self,
        server: &ServerInfo,
        workers: usize,
    ) -> Result<TransferStats, ProviderError> {
        let url = server_url(server)?;
        let started = Instant::now();
        let mut tasks: JoinSet<Result<u64, ProviderError>> = JoinSet::new();

        for worker in 0..workers.max(1) {
            let client = self.transfer.clone();
            let url = url.clone();
            tasks.spawn(async move {
                let mut bytes = 0u64;
                for request in 0..REQUESTS_PER_WORKER {
                    let size = UPLOAD_SIZES[(worker + request) % UPLOAD_SIZES.len()];
                    let payload = vec![b'0'; size];
                    client.post(url.clone()).body(payload).send().await.map_err(|e| {
                        ProviderError::new(format!("upload request to {url} failed"), e)
                    })?;
                    bytes += size as u64;
                }
                Ok(bytes)
            });
        }

        let total = drain(&mut tasks, "upload").await?;
        Ok(stats(total, started.elapsed()))
    }
}

/// Sum the byte counts of all transfer workers.
async fn drain(
    tasks: &mut JoinSet<Result<u64, ProviderError>>,
    phase: &'static str,
) -> Result<u64, ProviderError> {
    let mut total = 0u64;
    while let Some(joined) = tasks.join_next().await {
        total += joined.map_err(|e| ProviderError::new(format!("{phase} worker panicked"), e))??;
    }
    Ok(total)
}

fn stats(bytes: u64, elapsed: Duration) -> TransferStats {
    let seconds = elapsed.as_secs_f64().max(f64::EPSILON);
    TransferStats {
        bits_per_second: bytes as f64 * 8.0 / seconds,
        bytes_transferred: bytes,
    }
}

fn server_url(server: &ServerInfo) -> Result<Url, ProviderError> {
    Url::parse(&server.url)
        .map_err(|e| ProviderError::new(format!("invalid server URL {:?}", server.url), e))
}

/// Sibling `latency.txt` of the server's transfer URL.
fn latency_url(server: &ServerInfo) -> Result<Url, ProviderError> {
    server_url(server)?
        .join("latency.txt")
        .map_err(|e| ProviderError::new(format!("invalid server URL {:?}", server.url), e))
}

/// Great-circle distance between two coordinates, in kilometers.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6_371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}
