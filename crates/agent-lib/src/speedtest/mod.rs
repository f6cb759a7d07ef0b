//! Measurement session against the speedtest provider
//!
//! The provider itself is an injected capability; this module owns the
//! server selection policy and the phase ordering of one session. Server
//! ranking is delegated to the provider so tests can substitute a
//! deterministic implementation.

mod http;

pub use http::HttpSpeedtestProvider;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SpeedtestConfig;
use crate::models::{ClientInfo, MeasurementResult, ServerInfo, TransferStats};

/// Opaque failure inside the measurement provider.
#[derive(Debug, Error)]
#[error("{context}")]
pub struct ProviderError {
    context: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ProviderError {
    /// A provider failure with an underlying cause.
    pub fn new(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// A provider failure described only by a message.
    pub fn message(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: None,
        }
    }
}

/// Transfer phase of a measurement session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Download,
    Upload,
}

impl std::fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferPhase::Download => f.write_str("download"),
            TransferPhase::Upload => f.write_str("upload"),
        }
    }
}

/// Failures acquiring a measurement. One of these costs the current cycle
/// and nothing more.
#[derive(Debug, Error)]
pub enum MeasurementError {
    #[error("failed to establish measurement session")]
    Session(#[source] ProviderError),

    #[error("server selection failed")]
    ServerSelection(#[source] ProviderError),

    #[error("no suitable servers found")]
    NoSuitableServers,

    #[error("{phase} phase failed")]
    Transfer {
        phase: TransferPhase,
        #[source]
        source: ProviderError,
    },
}

/// Capability interface of the measurement provider.
#[async_trait]
pub trait SpeedtestProvider: Send + Sync {
    /// Establish a session and report the client identity.
    async fn handshake(&self) -> Result<ClientInfo, ProviderError>;

    /// List candidate servers. An empty `restrict` slice means all servers;
    /// otherwise only servers whose id is in the slice are returned.
    async fn servers(&self, restrict: &[u64]) -> Result<Vec<ServerInfo>, ProviderError>;

    /// Probe the candidates and return the best server by the provider's
    /// own ranking, with its measured latency filled in.
    async fn best_server(
        &self,
        client: &ClientInfo,
        candidates: Vec<ServerInfo>,
    ) -> Result<ServerInfo, ProviderError>;

    /// Run the download phase with the given worker count.
    async fn download(
        &self,
        server: &ServerInfo,
        workers: usize,
    ) -> Result<TransferStats, ProviderError>;

    /// Run the upload phase with the given worker count.
    async fn upload(
        &self,
        server: &ServerInfo,
        workers: usize,
    ) -> Result<TransferStats, ProviderError>;
}

/// Run one full measurement session.
///
/// Selection policy: preferred servers first; when none matches, the full
/// list is tried only if `any_server` is set, otherwise the session fails.
/// An operator who disables the fallback wants failures surfaced rather
/// than an arbitrary server measured.
pub async fn acquire(
    config: &SpeedtestConfig,
    provider: &dyn SpeedtestProvider,
) -> Result<MeasurementResult, MeasurementError> {
    let client = provider
        .handshake()
        .await
        .map_err(MeasurementError::Session)?;
    debug!(client_ip = %client.ip, isp = %client.isp, "measurement session established");

    let mut candidates = provider
        .servers(&config.pref_servers)
        .await
        .map_err(MeasurementError::ServerSelection)?;

    if candidates.is_empty() && !config.pref_servers.is_empty() {
        if config.any_server {
            warn!(
                preferred = ?config.pref_servers,
                "no preferred server matched, falling back to the full server list"
            );
            candidates = provider
                .servers(&[])
                .await
                .map_err(MeasurementError::ServerSelection)?;
        } else {
            return Err(MeasurementError::NoSuitableServers);
        }
    }
    if candidates.is_empty() {
        return Err(MeasurementError::NoSuitableServers);
    }

    let server = provider
        .best_server(&client, candidates)
        .await
        .map_err(MeasurementError::ServerSelection)?;
    debug!(
        server_id = server.id,
        host = %server.host,
        latency_ms = server.latency,
        "server selected"
    );

    let download = provider
        .download(&server, config.download_workers)
        .await
        .map_err(|source| MeasurementError::Transfer {
            phase: TransferPhase::Download,
            source,
        })?;
    let upload = provider
        .upload(&server, config.upload_workers)
        .await
        .map_err(|source| MeasurementError::Transfer {
            phase: TransferPhase::Upload,
            source,
        })?;

    let ping = server.latency;
    Ok(MeasurementResult {
        client,
        server,
        download: download.bits_per_second,
        upload: upload.bits_per_second,
        ping,
        bytes_received: download.bytes_transferred,
        bytes_sent: upload.bytes_transferred,
        timestamp: Utc::now(),
        share: None,
    })
}
