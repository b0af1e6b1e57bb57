// ── Lab backend boundary ──
//
// Everything the controller needs from the outside world, in domain
// terms. `HttpBackend` is the production implementation over
// `wanlab_api::LabClient`; tests substitute their own.

use std::pin::Pin;

use futures_core::Stream;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use tracing::debug;

use wanlab_api::LabClient;
use wanlab_api::models::PortRef;

use crate::convert::{status_to_summaries, to_port_setting};
use crate::error::CoreError;
use crate::model::{Port, PortKey, ShapingProfile, TelemetrySummary};

/// One normalized telemetry snapshot.
pub type TelemetryBatch = Vec<(PortKey, TelemetrySummary)>;

/// Push channel of telemetry snapshots. An `Err` item means the channel
/// is no longer trustworthy.
pub type TelemetryStream = Pin<Box<dyn Stream<Item = Result<TelemetryBatch, CoreError>> + Send>>;

/// Raw result of one probe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutput {
    /// Executor exit status was zero.
    pub ok: bool,
    pub output: String,
}

/// Containers and networks created by a lab init.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabLayout {
    pub server: Option<String>,
    pub clients: Vec<String>,
    pub networks: Vec<String>,
}

/// Operations the controller consumes from the lab service.
pub trait LabBackend: Send + Sync {
    /// Current topology.
    fn discover_ports(&self) -> BoxFuture<'_, Result<Vec<Port>, CoreError>>;

    /// Push shaping intents as one batch. Returns how many were applied.
    fn apply_shaping<'a>(
        &'a self,
        items: &'a [(PortKey, ShapingProfile)],
    ) -> BoxFuture<'a, Result<usize, CoreError>>;

    /// Poll current counters for `keys`.
    fn query_status<'a>(
        &'a self,
        keys: &'a [PortKey],
    ) -> BoxFuture<'a, Result<TelemetryBatch, CoreError>>;

    fn open_telemetry_stream(&self) -> BoxFuture<'_, Result<TelemetryStream, CoreError>>;

    /// Ping `target` from the container that owns `source`.
    fn run_probe<'a>(
        &'a self,
        source: &'a PortKey,
        target: &'a str,
        count: u32,
    ) -> BoxFuture<'a, Result<ProbeOutput, CoreError>>;

    fn init_lab(&self, ports: u32, recreate: bool) -> BoxFuture<'_, Result<LabLayout, CoreError>>;

    fn destroy_lab(&self) -> BoxFuture<'_, Result<(), CoreError>>;

    fn lab_status(&self) -> BoxFuture<'_, Result<serde_json::Value, CoreError>>;

    fn health(&self) -> BoxFuture<'_, Result<bool, CoreError>>;
}

// ── HttpBackend ──────────────────────────────────────────────────────

/// [`LabBackend`] over the HTTP API.
#[derive(Clone)]
pub struct HttpBackend {
    client: LabClient,
}

impl HttpBackend {
    pub fn new(client: LabClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &LabClient {
        &self.client
    }
}

impl LabBackend for HttpBackend {
    fn discover_ports(&self) -> BoxFuture<'_, Result<Vec<Port>, CoreError>> {
        Box::pin(async move {
            let raw = self.client.list_ports().await?;
            Ok(raw.into_iter().map(Port::from).collect())
        })
    }

    fn apply_shaping<'a>(
        &'a self,
        items: &'a [(PortKey, ShapingProfile)],
    ) -> BoxFuture<'a, Result<usize, CoreError>> {
        Box::pin(async move {
            let settings: Vec<_> = items
                .iter()
                .map(|(key, profile)| to_port_setting(key, profile))
                .collect();
            match self.client.apply_ports_matrix(&settings).await {
                Ok(count) => Ok(count),
                Err(wanlab_api::Error::Rejected { message }) => {
                    Err(CoreError::ApplyFailed { message })
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    fn query_status<'a>(
        &'a self,
        keys: &'a [PortKey],
    ) -> BoxFuture<'a, Result<TelemetryBatch, CoreError>> {
        Box::pin(async move {
            let refs: Vec<PortRef> = keys.iter().map(PortRef::from).collect();
            let map = self.client.status_ports(&refs).await?;
            Ok(status_to_summaries(&map))
        })
    }

    fn open_telemetry_stream(&self) -> BoxFuture<'_, Result<TelemetryStream, CoreError>> {
        Box::pin(async move {
            let raw = self.client.open_status_stream().await?;
            let stream = raw.map(|item| {
                item.map(|map| status_to_summaries(&map))
                    .map_err(CoreError::from)
            });
            Ok(Box::pin(stream) as TelemetryStream)
        })
    }

    fn run_probe<'a>(
        &'a self,
        source: &'a PortKey,
        target: &'a str,
        count: u32,
    ) -> BoxFuture<'a, Result<ProbeOutput, CoreError>> {
        Box::pin(async move {
            let resp = self.client.ping(source.name(), target, count).await?;
            debug!(source = %source, target, rc = resp.rc, "probe finished");
            Ok(ProbeOutput {
                ok: resp.ok,
                output: resp.out,
            })
        })
    }

    fn init_lab(&self, ports: u32, recreate: bool) -> BoxFuture<'_, Result<LabLayout, CoreError>> {
        Box::pin(async move {
            let resp = self.client.init_lab(ports, recreate).await?;
            Ok(LabLayout {
                server: resp.server,
                clients: resp.clients,
                networks: resp.networks,
            })
        })
    }

    fn destroy_lab(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        Box::pin(async move { Ok(self.client.destroy_lab().await?) })
    }

    fn lab_status(&self) -> BoxFuture<'_, Result<serde_json::Value, CoreError>> {
        Box::pin(async move { Ok(self.client.lab_status().await?) })
    }

    fn health(&self) -> BoxFuture<'_, Result<bool, CoreError>> {
        Box::pin(async move { Ok(self.client.health().await?) })
    }
}
