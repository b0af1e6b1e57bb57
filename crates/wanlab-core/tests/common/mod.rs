#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use wanlab_core::{
    ConfigStore, CoreError, LabBackend, LabLayout, MemoryBlobStore, Port, PortKey, ProbeOutput,
    SessionConfig, ShapingProfile, TelemetryBatch, TelemetryStream,
};

pub type StreamSender = mpsc::UnboundedSender<Result<TelemetryBatch, CoreError>>;

/// In-process lab: records every call and lets tests drive the
/// telemetry stream by hand.
#[derive(Default)]
pub struct FakeLab {
    pub ports: Mutex<Vec<Port>>,
    pub applied: Mutex<Vec<Vec<(PortKey, ShapingProfile)>>>,
    pub fail_apply: AtomicBool,
    pub fail_discovery: AtomicBool,
    pub status: Mutex<TelemetryBatch>,
    pub status_calls: AtomicUsize,
    pub stream_down: AtomicBool,
    /// Opens never answer: the connection is accepted, headers never come.
    pub stream_hangs: AtomicBool,
    pub stream_opens: AtomicUsize,
    pub stream_tx: Mutex<Option<StreamSender>>,
    pub probes: Mutex<Vec<(String, String, u32)>>,
    pub probe_reply: Mutex<Option<Result<ProbeOutput, String>>>,
    pub inits: Mutex<Vec<(u32, bool)>>,
    pub destroys: AtomicUsize,
}

impl FakeLab {
    pub fn with_ports(ports: Vec<Port>) -> Arc<Self> {
        let lab = Self::default();
        *lab.ports.lock().unwrap() = ports;
        Arc::new(lab)
    }

    /// Push one batch through the currently open stream.
    pub fn push(&self, batch: TelemetryBatch) {
        let tx = self.stream_tx.lock().unwrap();
        tx.as_ref().unwrap().send(Ok(batch)).unwrap();
    }

    /// Break the currently open stream.
    pub fn break_stream(&self) {
        if let Some(tx) = self.stream_tx.lock().unwrap().take() {
            let _ = tx.send(Err(CoreError::Transport {
                message: "stream reset".into(),
                status: None,
            }));
        }
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

fn down() -> CoreError {
    CoreError::Transport {
        message: "connection refused".into(),
        status: None,
    }
}

impl LabBackend for FakeLab {
    fn discover_ports(&self) -> BoxFuture<'_, Result<Vec<Port>, CoreError>> {
        Box::pin(async move {
            if self.fail_discovery.load(Ordering::SeqCst) {
                return Err(down());
            }
            Ok(self.ports.lock().unwrap().clone())
        })
    }

    fn apply_shaping<'a>(
        &'a self,
        items: &'a [(PortKey, ShapingProfile)],
    ) -> BoxFuture<'a, Result<usize, CoreError>> {
        Box::pin(async move {
            if self.fail_apply.load(Ordering::SeqCst) {
                return Err(CoreError::ApplyFailed {
                    message: "tc: invalid rate".into(),
                });
            }
            self.applied.lock().unwrap().push(items.to_vec());
            Ok(items.len())
        })
    }

    fn query_status<'a>(
        &'a self,
        _keys: &'a [PortKey],
    ) -> BoxFuture<'a, Result<TelemetryBatch, CoreError>> {
        Box::pin(async move {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.status.lock().unwrap().clone())
        })
    }

    fn open_telemetry_stream(&self) -> BoxFuture<'_, Result<TelemetryStream, CoreError>> {
        Box::pin(async move {
            self.stream_opens.fetch_add(1, Ordering::SeqCst);
            if self.stream_hangs.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.stream_down.load(Ordering::SeqCst) {
                return Err(down());
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *self.stream_tx.lock().unwrap() = Some(tx);
            let stream: TelemetryStream = Box::pin(UnboundedReceiverStream::new(rx));
            Ok(stream)
        })
    }

    fn run_probe<'a>(
        &'a self,
        source: &'a PortKey,
        target: &'a str,
        count: u32,
    ) -> BoxFuture<'a, Result<ProbeOutput, CoreError>> {
        Box::pin(async move {
            self.probes
                .lock()
                .unwrap()
                .push((source.name().to_owned(), target.to_owned(), count));
            match self.probe_reply.lock().unwrap().clone() {
                Some(Ok(out)) => Ok(out),
                Some(Err(message)) => Err(CoreError::Transport {
                    message,
                    status: Some(500),
                }),
                None => Ok(ProbeOutput {
                    ok: true,
                    output: format!(
                        "64 bytes from {target}: icmp_seq=1 ttl=64 time=51.2 ms\n"
                    ),
                }),
            }
        })
    }

    fn init_lab(&self, ports: u32, recreate: bool) -> BoxFuture<'_, Result<LabLayout, CoreError>> {
        Box::pin(async move {
            self.inits.lock().unwrap().push((ports, recreate));
            Ok(LabLayout {
                server: Some("lab_server".into()),
                clients: (1..=ports).map(|n| format!("client{n}")).collect(),
                networks: (1..=ports).map(|n| format!("lab_net{n}")).collect(),
            })
        })
    }

    fn destroy_lab(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        Box::pin(async move {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            self.ports.lock().unwrap().clear();
            Ok(())
        })
    }

    fn lab_status(&self) -> BoxFuture<'_, Result<serde_json::Value, CoreError>> {
        Box::pin(async move { Ok(serde_json::json!({ "running": true })) })
    }

    fn health(&self) -> BoxFuture<'_, Result<bool, CoreError>> {
        Box::pin(async move { Ok(true) })
    }
}

/// Two clients on separate subnets, one server with a leg in each.
pub fn two_subnet_lab() -> Vec<Port> {
    vec![
        Port::discovered("client1", "eth0@if7", Some("10.0.0.2/24".into())),
        Port::discovered("client2", "eth0@if9", Some("10.0.1.2/24".into())),
        Port::discovered("lab_server", "eth0", Some("10.0.0.1/24".into())),
        Port::discovered("lab_server", "eth1", Some("10.0.1.1/24".into())),
    ]
}

pub fn session_config(telemetry: bool) -> SessionConfig {
    let mut config = SessionConfig::new("http://lab.invalid:8080".parse().unwrap());
    config.telemetry_enabled = telemetry;
    config
}

pub fn memory_store() -> ConfigStore {
    ConfigStore::new(Arc::new(MemoryBlobStore::new()))
}

pub fn key(raw: &str) -> PortKey {
    raw.parse().unwrap()
}
