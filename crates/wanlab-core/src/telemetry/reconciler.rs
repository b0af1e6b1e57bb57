// ── Telemetry reconciler ──
//
// Keeps the board current from exactly one source at a time: the push
// stream while it is healthy, a fixed-interval status poll while it is
// not. While degraded the stream is re-opened with exponential backoff
// alongside the poll; a successful re-open stops the poll.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use strum::Display;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wanlab_api::stream::{ReconnectConfig, calculate_backoff};

use crate::backend::{LabBackend, TelemetryBatch, TelemetryStream};
use crate::error::CoreError;
use crate::model::{PortKey, TelemetrySource};
use crate::telemetry::board::TelemetryBoard;

/// Observable reconciler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ReconcilerState {
    Idle,
    Streaming,
    Degraded,
}

/// Tuning for the reconcile loop.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub poll_interval: Duration,
    /// When false the stream is never opened and polling runs for the
    /// whole session.
    pub stream_enabled: bool,
    pub reconnect: ReconnectConfig,
    /// Upper bound on waiting for the stream's response headers.
    pub open_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            stream_enabled: true,
            reconnect: ReconnectConfig::default(),
            open_timeout: Duration::from_secs(30),
        }
    }
}

/// Owns the reconcile task.
pub struct TelemetryReconciler {
    board: Arc<TelemetryBoard>,
    state: Arc<watch::Sender<ReconcilerState>>,
    config: ReconcilerConfig,
    cancel: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryReconciler {
    pub fn new(board: Arc<TelemetryBoard>, config: ReconcilerConfig) -> Self {
        let (state, _) = watch::channel(ReconcilerState::Idle);
        Self {
            board,
            state: Arc::new(state),
            config,
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ReconcilerState> {
        self.state.subscribe()
    }

    pub fn board(&self) -> &Arc<TelemetryBoard> {
        &self.board
    }

    /// Spawn the reconcile task. `keys` publishes the port keys the poll
    /// should query. A second call while running is a no-op.
    pub async fn start(
        &self,
        backend: Arc<dyn LabBackend>,
        keys: watch::Receiver<Vec<PortKey>>,
        parent: &CancellationToken,
    ) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let cancel = parent.child_token();
        *self.cancel.lock().await = Some(cancel.clone());

        let task = ReconcileTask {
            backend,
            board: Arc::clone(&self.board),
            state: Arc::clone(&self.state),
            keys,
            config: self.config.clone(),
            cancel,
        };
        *handle = Some(tokio::spawn(task.run()));
    }

    /// Stop the task and wait for it. Idempotent.
    pub async fn close(&self) {
        if let Some(cancel) = self.cancel.lock().await.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
        self.state.send_replace(ReconcilerState::Idle);
    }
}

// ── Reconcile loop ───────────────────────────────────────────────────

type OpenFuture<'a> = BoxFuture<'a, Result<TelemetryStream, CoreError>>;

struct ReconcileTask {
    backend: Arc<dyn LabBackend>,
    board: Arc<TelemetryBoard>,
    state: Arc<watch::Sender<ReconcilerState>>,
    keys: watch::Receiver<Vec<PortKey>>,
    config: ReconcilerConfig,
    cancel: CancellationToken,
}

impl ReconcileTask {
    async fn run(self) {
        let mut attempt: u32 = 0;
        let mut opened = None;

        if self.config.stream_enabled {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {}
                r = self.open_stream() => match r {
                    Ok(stream) => opened = Some(stream),
                    Err(e) => debug!(error = %e, "telemetry stream unavailable"),
                },
            }
        }

        while !self.cancel.is_cancelled() {
            if let Some(stream) = opened.take() {
                attempt = 0;
                if !self.follow(stream).await {
                    break;
                }
            }
            match self.degraded(&mut attempt).await {
                Some(stream) => opened = Some(stream),
                None => break,
            }
        }
        self.set_state(ReconcilerState::Idle);
    }

    /// Apply stream batches until the stream fails. Returns false when
    /// the task was cancelled.
    async fn follow(&self, mut stream: TelemetryStream) -> bool {
        self.set_state(ReconcilerState::Streaming);
        info!("telemetry stream open");
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                item = stream.next() => match item {
                    Some(Ok(batch)) => self.apply_known(batch, TelemetrySource::Stream),
                    Some(Err(e)) => {
                        warn!(error = %e, "telemetry stream failed, polling");
                        return true;
                    }
                    None => {
                        warn!("telemetry stream closed, polling");
                        return true;
                    }
                },
            }
        }
    }

    /// Poll on a fixed interval while re-opening the stream in the
    /// background. The poll keeps running during an open attempt. Returns
    /// the re-opened stream, or `None` when cancelled.
    async fn degraded(&self, attempt: &mut u32) -> Option<TelemetryStream> {
        self.set_state(ReconcilerState::Degraded);

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry_at = self.schedule_retry(attempt);
        let mut opening: Option<OpenFuture<'_>> = None;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                r = in_flight(&mut opening) => {
                    opening = None;
                    match r {
                        Ok(stream) => return Some(stream),
                        Err(e) => {
                            debug!(error = %e, attempt = *attempt, "telemetry stream unavailable");
                            retry_at = self.schedule_retry(attempt);
                        }
                    }
                }
                () = sleep_until(retry_at) => {
                    retry_at = None;
                    opening = Some(Box::pin(self.open_stream()));
                }
                _ = interval.tick() => self.poll_once().await,
            }
        }
    }

    fn schedule_retry(&self, attempt: &mut u32) -> Option<Instant> {
        if !self.config.stream_enabled {
            return None;
        }
        let delay = calculate_backoff(*attempt, &self.config.reconnect);
        debug!(?delay, attempt = *attempt, "scheduling stream re-open");
        *attempt = attempt.saturating_add(1);
        Some(Instant::now() + delay)
    }

    /// Open the stream, bounding the wait for response headers.
    async fn open_stream(&self) -> Result<TelemetryStream, CoreError> {
        tokio::time::timeout(self.config.open_timeout, self.backend.open_telemetry_stream())
            .await
            .unwrap_or_else(|_| {
                Err(CoreError::Transport {
                    message: format!(
                        "telemetry stream did not answer within {:?}",
                        self.config.open_timeout
                    ),
                    status: None,
                })
            })
    }

    async fn poll_once(&self) {
        let keys = self.keys.borrow().clone();
        if keys.is_empty() {
            debug!("no ports to poll");
            return;
        }
        match self.backend.query_status(&keys).await {
            Ok(batch) => self.apply_known(batch, TelemetrySource::Poll),
            Err(e) => debug!(error = %e, "status poll failed"),
        }
    }

    /// Store the entries for ports still in the table. Removed ports stay
    /// off the board even though the backend keeps reporting them.
    fn apply_known(&self, batch: TelemetryBatch, source: TelemetrySource) {
        let batch: TelemetryBatch = {
            let known = self.keys.borrow();
            batch
                .into_iter()
                .filter(|(key, _)| known.contains(key))
                .collect()
        };
        self.board.apply(&batch, source);
    }

    fn set_state(&self, state: ReconcilerState) {
        self.state.send_if_modified(|s| {
            if *s == state {
                false
            } else {
                *s = state;
                true
            }
        });
    }
}

async fn in_flight(opening: &mut Option<OpenFuture<'_>>) -> Result<TelemetryStream, CoreError> {
    match opening {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
