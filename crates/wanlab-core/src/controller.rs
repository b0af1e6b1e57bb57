// ── Controller session ──
//
// One owned session against a lab backend. Mutations of the port table
// and the config store are serialized through the command processor;
// telemetry and probes run as their own cancellable tasks.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use strum::Display;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wanlab_api::LabClient;

use crate::backend::{HttpBackend, LabBackend};
use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::model::snapshot::lookup;
use crate::model::{
    LabExport, LabSnapshot, PortKey, PortRole, PortView, Preset, PresetScope, ProfileMap,
    ProfilePatch, ShapingProfile,
};
use crate::probe::{ProbeDirection, ProbeMode, ProbeSession};
use crate::resolver::{ProbeTarget, resolve_client_for, resolve_server_for};
use crate::store::{ConfigStore, FileBlobStore, MemoryBlobStore, PortTable, RefreshDiff};
use crate::telemetry::{
    ReconcilerConfig, ReconcilerState, TelemetryBoard, TelemetryReconciler, TelemetrySnapshot,
};

const COMMAND_CHANNEL_SIZE: usize = 64;

/// Lab sizes the backend accepts.
pub const LAB_PORT_RANGE: std::ops::RangeInclusive<u32> = 1..=32;

type ProbeSlot = (PortKey, ProbeDirection);

// ── SessionState ─────────────────────────────────────────────────────

/// Session lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Created,
    Open,
    Closed,
}

// ── Controller ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: SessionConfig,
    backend: Arc<dyn LabBackend>,
    store: ConfigStore,
    table: RwLock<PortTable>,
    board: Arc<TelemetryBoard>,
    reconciler: TelemetryReconciler,
    /// Current table keys, consumed by the status poll.
    keys: watch::Sender<Vec<PortKey>>,
    state: watch::Sender<SessionState>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    probes: DashMap<ProbeSlot, Arc<ProbeSession>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Build a session over HTTP. Does NOT contact the backend; call
    /// [`open()`](Self::open).
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let client = LabClient::new(config.backend.clone(), &config.transport())?;
        let store = match &config.data_dir {
            Some(dir) => ConfigStore::new(Arc::new(FileBlobStore::new(dir))),
            None => ConfigStore::new(Arc::new(MemoryBlobStore::new())),
        };
        Ok(Self::with_backend(
            config,
            Arc::new(HttpBackend::new(client)),
            store,
        ))
    }

    /// Build a session over any backend and store.
    pub fn with_backend(
        config: SessionConfig,
        backend: Arc<dyn LabBackend>,
        store: ConfigStore,
    ) -> Self {
        let board = Arc::new(TelemetryBoard::new());
        let reconciler = TelemetryReconciler::new(
            Arc::clone(&board),
            ReconcilerConfig {
                poll_interval: config.poll_interval,
                stream_enabled: config.stream_enabled,
                open_timeout: config.timeout,
                ..ReconcilerConfig::default()
            },
        );
        let (keys, _) = watch::channel(Vec::new());
        let (state, _) = watch::channel(SessionState::Created);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                backend,
                store,
                table: RwLock::new(PortTable::new()),
                board,
                reconciler,
                keys,
                state,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
                probes: DashMap::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &ConfigStore {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the command processor, run the first refresh, and start
    /// telemetry if enabled. Opening an open session is a no-op.
    pub async fn open(&self) -> Result<(), CoreError> {
        match self.session_state() {
            SessionState::Open => return Ok(()),
            SessionState::Closed => return Err(CoreError::SessionClosed),
            SessionState::Created => {}
        }
        let Some(rx) = self.inner.command_rx.lock().await.take() else {
            return Ok(());
        };
        self.inner
            .task_handles
            .lock()
            .await
            .push(tokio::spawn(command_processor_task(self.clone(), rx)));
        self.inner.state.send_replace(SessionState::Open);
        info!(backend = %self.inner.config.backend, "session open");

        self.execute(Command::Refresh).await?;

        if self.inner.config.telemetry_enabled {
            self.inner
                .reconciler
                .start(
                    Arc::clone(&self.inner.backend),
                    self.inner.keys.subscribe(),
                    &self.inner.cancel,
                )
                .await;
        }
        Ok(())
    }

    /// Stop every probe, the reconciler and the command processor.
    /// Idempotent.
    pub async fn close(&self) {
        if self.inner.state.send_replace(SessionState::Closed) == SessionState::Closed {
            return;
        }
        self.inner.cancel.cancel();
        self.inner.reconciler.close().await;

        let probes: Vec<Arc<ProbeSession>> = self
            .inner
            .probes
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for probe in probes {
            probe.shutdown().await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("session closed");
    }

    /// Open a session without telemetry, run `f`, close it.
    pub async fn oneshot<F, Fut, T>(config: SessionConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.telemetry_enabled = false;

        let controller = Controller::new(cfg)?;
        controller.open().await?;
        let result = f(controller.clone()).await;
        controller.close().await;
        result
    }

    pub fn session_state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_session_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    // ── Command execution ────────────────────────────────────────────

    /// Send a command to the processor and await its result.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if self.session_state() != SessionState::Open {
            return Err(CoreError::SessionClosed);
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::SessionClosed)?;

        rx.await.map_err(|_| CoreError::SessionClosed)?
    }

    // ── Port reads ───────────────────────────────────────────────────

    /// Every port joined with its telemetry, in table order.
    pub async fn ports(&self) -> Vec<PortView> {
        let table = self.inner.table.read().await;
        table
            .iter()
            .map(|e| PortView::new(&e.port, &e.profile, self.inner.board.get(&e.port.key)))
            .collect()
    }

    pub async fn port(&self, key: &PortKey) -> Result<PortView, CoreError> {
        let table = self.inner.table.read().await;
        table
            .get(key)
            .map(|e| PortView::new(&e.port, &e.profile, self.inner.board.get(key)))
            .ok_or_else(|| CoreError::UnknownKey {
                key: key.to_string(),
            })
    }

    /// Resolve an operator-typed `name:iface` to the table's key.
    pub async fn resolve_key(&self, raw: &str) -> Result<PortKey, CoreError> {
        self.inner.table.read().await.resolve(raw).cloned()
    }

    pub async fn primary_server(&self) -> Option<PortKey> {
        self.inner.table.read().await.primary_server().cloned()
    }

    /// Where a probe from `key` in `direction` would go.
    pub async fn resolve_target(
        &self,
        key: &PortKey,
        direction: ProbeDirection,
    ) -> Option<ProbeTarget> {
        let table = self.inner.table.read().await;
        let ports = table.ports();
        match direction {
            ProbeDirection::ClientToServer => {
                resolve_server_for(key, &ports, table.primary_server())
            }
            ProbeDirection::ServerToClient => resolve_client_for(key, &ports),
        }
    }

    // ── Telemetry reads ──────────────────────────────────────────────

    pub fn telemetry(&self) -> Arc<TelemetrySnapshot> {
        self.inner.board.snapshot()
    }

    pub fn subscribe_telemetry(&self) -> watch::Receiver<Arc<TelemetrySnapshot>> {
        self.inner.board.subscribe()
    }

    pub fn telemetry_state(&self) -> ReconcilerState {
        self.inner.reconciler.state()
    }

    pub fn subscribe_telemetry_state(&self) -> watch::Receiver<ReconcilerState> {
        self.inner.reconciler.subscribe_state()
    }

    // ── Snapshot / export reads ──────────────────────────────────────

    pub fn snapshots(&self) -> Vec<String> {
        self.inner.store.list_snapshots()
    }

    pub fn snapshot(&self, name: &str) -> Result<LabSnapshot, CoreError> {
        self.inner.store.load_snapshot(name)
    }

    /// Export document for the current table plus any stored entries for
    /// ports not currently present.
    pub async fn export(&self) -> LabExport {
        let table = self.inner.table.read().await;
        let mut cfg = table.profiles();
        for (raw, profile) in self.inner.store.load() {
            let present = raw
                .parse::<PortKey>()
                .is_ok_and(|key| table.get(&key).is_some());
            if !present {
                cfg.entry(raw).or_insert(profile);
            }
        }
        ConfigStore::export(cfg, Utc::now())
    }

    // ── Backend passthrough ──────────────────────────────────────────

    pub async fn lab_status(&self) -> Result<serde_json::Value, CoreError> {
        self.inner.backend.lab_status().await
    }

    pub async fn health(&self) -> Result<bool, CoreError> {
        self.inner.backend.health().await
    }

    // ── Probes ───────────────────────────────────────────────────────

    /// Resolve a target and start a probe from `key`. A probe already
    /// running on the same port and direction is stopped first.
    pub async fn start_probe(
        &self,
        key: &PortKey,
        direction: ProbeDirection,
        mode: ProbeMode,
    ) -> Result<Arc<ProbeSession>, CoreError> {
        if self.session_state() != SessionState::Open {
            return Err(CoreError::SessionClosed);
        }

        let (source, target) = {
            let table = self.inner.table.read().await;
            let source = table
                .get(key)
                .map(|e| e.port.key.clone())
                .ok_or_else(|| CoreError::UnknownKey {
                    key: key.to_string(),
                })?;
            let expected = match direction {
                ProbeDirection::ClientToServer => PortRole::Client,
                ProbeDirection::ServerToClient => PortRole::Server,
            };
            if source.role() != expected {
                return Err(CoreError::validation(format!(
                    "{direction} probe needs a {expected} port, {source} is a {}",
                    source.role()
                )));
            }
            let ports = table.ports();
            let target = match direction {
                ProbeDirection::ClientToServer => {
                    resolve_server_for(&source, &ports, table.primary_server())
                }
                ProbeDirection::ServerToClient => resolve_client_for(&source, &ports),
            }
            .ok_or_else(|| {
                CoreError::validation(format!("no peer with an address to probe from {source}"))
            })?;
            (source, target)
        };

        let slot = (source.clone(), direction);
        if let Some((_, previous)) = self.inner.probes.remove(&slot) {
            debug!(source = %source, %direction, "replacing running probe");
            previous.shutdown().await;
        }

        let session = Arc::new(ProbeSession::new(source, direction, mode, target));
        session
            .start(Arc::clone(&self.inner.backend), &self.inner.cancel)
            .await?;
        self.inner.probes.insert(slot, Arc::clone(&session));
        Ok(session)
    }

    /// Request a stop of the probe on `key`/`direction`, if any.
    pub async fn stop_probe(&self, key: &PortKey, direction: ProbeDirection) {
        let probe = self
            .inner
            .probes
            .get(&(key.clone(), direction))
            .map(|e| Arc::clone(e.value()));
        if let Some(probe) = probe {
            probe.stop().await;
        }
    }

    pub fn probe(&self, key: &PortKey, direction: ProbeDirection) -> Option<Arc<ProbeSession>> {
        self.inner
            .probes
            .get(&(key.clone(), direction))
            .map(|e| Arc::clone(e.value()))
    }

    /// Render a probe's log with the current profiles of both ends.
    pub async fn export_probe_log(
        &self,
        key: &PortKey,
        direction: ProbeDirection,
    ) -> Result<(String, String), CoreError> {
        let probe = self.probe(key, direction).ok_or_else(|| {
            CoreError::validation(format!("no {direction} probe recorded for {key}"))
        })?;
        let table = self.inner.table.read().await;
        let own = table
            .get(probe.source())
            .map(|e| e.profile.clone())
            .unwrap_or_default();
        let peer = table.get(&probe.target().peer).map(|e| e.profile.clone());
        let now = Utc::now();
        Ok((
            probe.log_file_name(now),
            probe.export_log(&own, peer.as_ref(), now),
        ))
    }

    // ── Command handlers ─────────────────────────────────────────────

    async fn refresh_ports(&self) -> Result<RefreshDiff, CoreError> {
        let discovered = match self.inner.backend.discover_ports().await {
            Ok(ports) => ports,
            Err(e) => {
                warn!(error = %e, "port discovery failed, treating as empty");
                Vec::new()
            }
        };
        let stored = self.inner.store.load();
        let customs = self.inner.store.custom_ports();

        let diff = {
            let mut table = self.inner.table.write().await;
            for key in customs {
                if table.get(&key).is_none() {
                    let profile = lookup(&stored, &key).cloned();
                    if let Err(e) = table.add_custom(key, profile) {
                        debug!(error = %e, "skipping stored custom port");
                    }
                }
            }
            let diff = table.refresh(discovered, &stored);
            self.publish_keys(&table);
            diff
        };

        for key in &diff.removed {
            self.forget_runtime(key).await;
        }
        info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            "ports refreshed"
        );
        Ok(diff)
    }

    async fn add_custom_port(&self, key: PortKey) -> Result<PortView, CoreError> {
        let view = {
            let mut table = self.inner.table.write().await;
            let entry = table.add_custom(key, None)?;
            let view = PortView::new(&entry.port, &entry.profile, None);
            self.publish_keys(&table);
            view
        };
        self.inner.store.add_custom_port(&view.key)?;
        self.inner.store.merge([(&view.key, &view.profile)])?;
        info!(key = %view.key, "custom port added");
        Ok(view)
    }

    async fn remove_port(&self, key: &PortKey) -> Result<(), CoreError> {
        let removed = {
            let mut table = self.inner.table.write().await;
            let removed = table.remove(key);
            self.publish_keys(&table);
            removed
        };
        self.inner.store.remove_custom_port(key)?;
        self.inner.store.forget(key)?;
        self.forget_runtime(key).await;
        if removed.is_some() {
            info!(key = %key, "port removed");
        }
        Ok(())
    }

    async fn edit_port(&self, key: &PortKey, patch: &ProfilePatch) -> Result<PortView, CoreError> {
        let view = {
            let mut table = self.inner.table.write().await;
            let entry = table.edit(key, patch)?;
            PortView::new(&entry.port, &entry.profile, self.inner.board.get(key))
        };
        self.inner.store.merge([(&view.key, &view.profile)])?;
        debug!(key = %view.key, "profile edited");
        Ok(view)
    }

    async fn apply(&self, keys: Option<&[PortKey]>) -> Result<usize, CoreError> {
        let items = {
            let table = self.inner.table.read().await;
            match keys {
                None => table
                    .iter()
                    .map(|e| (e.port.key.clone(), e.profile.clone()))
                    .collect(),
                Some(keys) => {
                    let mut items: Vec<(PortKey, ShapingProfile)> = Vec::with_capacity(keys.len());
                    for key in keys {
                        let entry = table.get(key).ok_or_else(|| CoreError::UnknownKey {
                            key: key.to_string(),
                        })?;
                        if !items.iter().any(|(k, _)| k == key) {
                            items.push((entry.port.key.clone(), entry.profile.clone()));
                        }
                    }
                    items
                }
            }
        };
        self.push_batch(&items).await
    }

    async fn apply_preset(&self, preset: Preset, scope: PresetScope) -> Result<usize, CoreError> {
        let profile = preset.profile();
        let items: Vec<(PortKey, ShapingProfile)> = {
            let mut table = self.inner.table.write().await;
            let keys: Vec<PortKey> = table
                .iter()
                .filter(|e| scope.includes(e.port.role()))
                .map(|e| e.port.key.clone())
                .collect();
            for key in &keys {
                table.set_profile(key, profile.clone())?;
            }
            keys.into_iter().map(|k| (k, profile.clone())).collect()
        };
        self.inner
            .store
            .merge(items.iter().map(|(k, p)| (k, p)))?;
        info!(%preset, %scope, ports = items.len(), "preset painted");
        self.push_batch(&items).await
    }

    /// One backend apply; the store is updated only on success. An empty
    /// batch never reaches the backend.
    async fn push_batch(&self, items: &[(PortKey, ShapingProfile)]) -> Result<usize, CoreError> {
        if items.is_empty() {
            debug!("nothing selected, skipping apply");
            return Ok(0);
        }
        let count = self.inner.backend.apply_shaping(items).await?;
        self.inner
            .store
            .merge(items.iter().map(|(k, p)| (k, p)))?;
        info!(count, "shaping applied");
        Ok(count)
    }

    /// Overwrite matching ports with the profiles in `cfg`.
    async fn paint(&self, cfg: &ProfileMap) -> Result<Vec<(PortKey, ShapingProfile)>, CoreError> {
        let painted = {
            let mut table = self.inner.table.write().await;
            let mut painted = Vec::new();
            for key in table.keys() {
                if let Some(profile) = lookup(cfg, &key) {
                    table.set_profile(&key, profile.clone())?;
                    painted.push((key, profile.clone()));
                }
            }
            painted
        };
        self.inner
            .store
            .merge(painted.iter().map(|(k, p)| (k, p)))?;
        Ok(painted)
    }

    async fn load_snapshot(&self, name: &str, apply: bool) -> Result<CommandResult, CoreError> {
        let snap = self.inner.store.load_snapshot(name)?;
        let painted = self.paint(&snap.cfg).await?;
        let applied = if apply {
            Some(self.push_batch(&painted).await?)
        } else {
            None
        };
        info!(name, painted = painted.len(), "snapshot loaded");
        Ok(CommandResult::Painted {
            painted: painted.len(),
            applied,
        })
    }

    async fn import(&self, text: &str, restore: bool) -> Result<CommandResult, CoreError> {
        let imported = self.inner.store.import(text)?;

        if restore && imported.desired_ports > 0 {
            let ports = imported.desired_ports.min(*LAB_PORT_RANGE.end());
            match self.inner.backend.init_lab(ports, true).await {
                Ok(layout) => info!(ports, clients = layout.clients.len(), "lab re-created"),
                Err(e) => warn!(error = %e, ports, "lab re-create failed, restoring onto current topology"),
            }
        }

        self.refresh_ports().await?;
        let painted = self.paint(&imported.cfg).await?;
        let applied = if restore {
            Some(self.push_batch(&painted).await?)
        } else {
            None
        };
        Ok(CommandResult::Imported {
            entries: imported.cfg.len(),
            desired_ports: imported.desired_ports,
            painted: painted.len(),
            applied,
        })
    }

    async fn init_lab(&self, ports: u32, recreate: bool) -> Result<CommandResult, CoreError> {
        if !LAB_PORT_RANGE.contains(&ports) {
            return Err(CoreError::validation(format!(
                "lab size must be within {}..={}, got {ports}",
                LAB_PORT_RANGE.start(),
                LAB_PORT_RANGE.end()
            )));
        }
        let layout = self.inner.backend.init_lab(ports, recreate).await?;
        info!(ports, recreate, "lab initialized");
        self.refresh_ports().await?;
        Ok(CommandResult::Lab(layout))
    }

    async fn destroy_lab(&self) -> Result<(), CoreError> {
        self.inner.backend.destroy_lab().await?;
        info!("lab destroyed");
        self.refresh_ports().await?;
        Ok(())
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish_keys(&self, table: &PortTable) {
        self.inner.keys.send_replace(table.keys());
    }

    /// Drop telemetry and stop probes for a port that left the table.
    async fn forget_runtime(&self, key: &PortKey) {
        self.inner.board.remove(key);
        for direction in [ProbeDirection::ClientToServer, ProbeDirection::ServerToClient] {
            if let Some((_, probe)) = self.inner.probes.remove(&(key.clone(), direction)) {
                probe.stop().await;
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Process commands from the mpsc channel one at a time.
async fn command_processor_task(controller: Controller, mut rx: mpsc::Receiver<CommandEnvelope>) {
    let cancel = controller.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(&controller, envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

// ── Command routing ──────────────────────────────────────────────────

async fn route_command(controller: &Controller, cmd: Command) -> Result<CommandResult, CoreError> {
    match cmd {
        Command::Refresh => controller.refresh_ports().await.map(CommandResult::Refreshed),
        Command::AddCustomPort { key } => {
            controller.add_custom_port(key).await.map(CommandResult::Port)
        }
        Command::RemovePort { key } => {
            controller.remove_port(&key).await?;
            Ok(CommandResult::Ok)
        }
        Command::EditPort { key, patch } => controller
            .edit_port(&key, &patch)
            .await
            .map(CommandResult::Port),
        Command::Apply { keys } => {
            let count = controller.apply(keys.as_deref()).await?;
            Ok(CommandResult::Applied { count })
        }
        Command::ApplyPreset { preset, scope } => {
            let count = controller.apply_preset(preset, scope).await?;
            Ok(CommandResult::Applied { count })
        }
        Command::SaveSnapshot { name } => {
            let cfg = controller.inner.table.read().await.profiles();
            let snap = controller.inner.store.save_snapshot(&name, cfg, Utc::now())?;
            info!(name = %snap.name, "snapshot saved");
            Ok(CommandResult::Snapshot(snap))
        }
        Command::LoadSnapshot { name, apply } => controller.load_snapshot(&name, apply).await,
        Command::DeleteSnapshot { name } => {
            controller.inner.store.delete_snapshot(&name)?;
            Ok(CommandResult::Ok)
        }
        Command::Import { text, restore } => controller.import(&text, restore).await,
        Command::InitLab { ports, recreate } => controller.init_lab(ports, recreate).await,
        Command::DestroyLab => {
            controller.destroy_lab().await?;
            Ok(CommandResult::Ok)
        }
    }
}
