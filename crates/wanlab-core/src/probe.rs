// ── Probe sessions ──
//
// One diagnostic ping run for one port in one direction. The target is
// resolved by the caller before start and never changes afterwards.
// Failures are recorded as log lines; they never end a continuous run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use wanlab_api::tools::PING_COUNT_RANGE;

use crate::backend::LabBackend;
use crate::error::CoreError;
use crate::model::{PortKey, ShapingProfile};
use crate::resolver::ProbeTarget;

const CONTINUOUS_PAUSE: Duration = Duration::from_secs(1);
const LOG_TITLE: &str = "WAN Lab Ping Log";

// ── Types ────────────────────────────────────────────────────────────

/// Which end of the link initiates the ping.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ProbeDirection {
    ClientToServer,
    ServerToClient,
}

/// How many pings to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    /// One request with `count` pings, clamped to the executor's range.
    Single(u32),
    /// 1-count requests once a second until stopped.
    Continuous,
}

impl ProbeMode {
    pub fn single(count: u32) -> Self {
        Self::Single(count.clamp(*PING_COUNT_RANGE.start(), *PING_COUNT_RANGE.end()))
    }

    fn count_label(self) -> String {
        match self {
            Self::Single(n) => n.to_string(),
            Self::Continuous => "inf".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProbeState {
    Armed,
    Running,
    Stopped,
}

/// One entry in a probe log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeLine {
    /// Round-trip time as printed by ping, e.g. `0.045`.
    Rtt { seq: Option<u64>, ms: String },
    Raw { text: String },
    Error { text: String },
}

impl fmt::Display for ProbeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rtt { seq: Some(seq), ms } => write!(f, "#{seq} {ms} ms"),
            Self::Rtt { seq: None, ms } => write!(f, "{ms} ms"),
            Self::Raw { text } | Self::Error { text } => f.write_str(text),
        }
    }
}

// ── Output parsing ───────────────────────────────────────────────────

/// Reduce one ping reply to a single log line: the first line carrying a
/// round-trip time, else the whole trimmed output.
pub fn parse_probe_output(output: &str) -> ProbeLine {
    let text = output.trim();
    text.lines()
        .find_map(|line| {
            rtt_of(line).map(|ms| ProbeLine::Rtt {
                seq: seq_of(line),
                ms: ms.to_owned(),
            })
        })
        .unwrap_or_else(|| ProbeLine::Raw {
            text: text.to_owned(),
        })
}

/// `time=<ms> ms` or `time<<ms> ms`, case-insensitive.
fn rtt_of(line: &str) -> Option<&str> {
    let lower = line.to_ascii_lowercase();
    lower.match_indices("time").find_map(|(at, _)| {
        let start = at + "time".len();
        let rest = lower.get(start..)?;
        if !rest.starts_with(['=', '<']) {
            return None;
        }
        let num_len = rest[1..]
            .bytes()
            .take_while(|b| b.is_ascii_digit() || *b == b'.')
            .count();
        if num_len == 0 || !rest[1 + num_len..].trim_start().starts_with("ms") {
            return None;
        }
        line.get(start + 1..start + 1 + num_len)
    })
}

/// `seq=<n>`, `seq <n>` or `icmp_seq=<n>`.
fn seq_of(line: &str) -> Option<u64> {
    let lower = line.to_ascii_lowercase();
    lower.match_indices("seq").find_map(|(at, _)| {
        let rest = lower.get(at + "seq".len()..)?;
        let digits = rest.strip_prefix(['=', ' '])?;
        let len = digits.bytes().take_while(u8::is_ascii_digit).count();
        digits.get(..len)?.parse().ok()
    })
}

// ── ProbeSession ─────────────────────────────────────────────────────

/// A single probe run.
#[derive(Debug)]
pub struct ProbeSession {
    source: PortKey,
    direction: ProbeDirection,
    mode: ProbeMode,
    target: ProbeTarget,
    state: Arc<watch::Sender<ProbeState>>,
    lines: Arc<watch::Sender<Arc<Vec<ProbeLine>>>>,
    cancel: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProbeSession {
    pub fn new(
        source: PortKey,
        direction: ProbeDirection,
        mode: ProbeMode,
        target: ProbeTarget,
    ) -> Self {
        let (state, _) = watch::channel(ProbeState::Armed);
        let (lines, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            source,
            direction,
            mode,
            target,
            state: Arc::new(state),
            lines: Arc::new(lines),
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &PortKey {
        &self.source
    }

    pub fn direction(&self) -> ProbeDirection {
        self.direction
    }

    pub fn mode(&self) -> ProbeMode {
        self.mode
    }

    pub fn target(&self) -> &ProbeTarget {
        &self.target
    }

    pub fn state(&self) -> ProbeState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProbeState> {
        self.state.subscribe()
    }

    pub fn lines(&self) -> Arc<Vec<ProbeLine>> {
        self.lines.borrow().clone()
    }

    pub fn subscribe_lines(&self) -> watch::Receiver<Arc<Vec<ProbeLine>>> {
        self.lines.subscribe()
    }

    /// Armed → Running. The run is cancelled with `parent`.
    pub async fn start(
        &self,
        backend: Arc<dyn LabBackend>,
        parent: &CancellationToken,
    ) -> Result<(), CoreError> {
        let mut handle = self.handle.lock().await;
        if self.state() != ProbeState::Armed {
            return Err(CoreError::validation(format!(
                "probe on {} already started",
                self.source
            )));
        }
        let cancel = parent.child_token();
        *self.cancel.lock().await = Some(cancel.clone());
        self.state.send_replace(ProbeState::Running);
        info!(
            source = %self.source,
            target = %self.target.address,
            direction = %self.direction,
            "probe started"
        );

        let run = ProbeRun {
            backend,
            source: self.source.clone(),
            address: self.target.address.clone(),
            mode: self.mode,
            state: Arc::clone(&self.state),
            lines: Arc::clone(&self.lines),
            cancel,
        };
        *handle = Some(tokio::spawn(run.run()));
        Ok(())
    }

    /// Request a stop. Takes effect at the next iteration boundary.
    pub async fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().await.as_ref() {
            cancel.cancel();
        }
    }

    /// Wait for the run to finish.
    pub async fn wait(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Stop and wait. Idempotent.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.wait().await;
    }

    // ── Log export ───────────────────────────────────────────────────

    /// Name of the client side of the link.
    pub fn client_name(&self) -> &str {
        match self.direction {
            ProbeDirection::ClientToServer => self.source.name(),
            ProbeDirection::ServerToClient => self.target.peer.name(),
        }
    }

    /// `ping-<client>-<YYYYmmdd-HHMMSS>.txt`
    pub fn log_file_name(&self, saved_at: DateTime<Utc>) -> String {
        let safe: String = self
            .client_name()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("ping-{safe}-{}.txt", saved_at.format("%Y%m%d-%H%M%S"))
    }

    /// Render the log with its header. `own` is the source port's profile,
    /// `peer` the pinged port's profile when known.
    pub fn export_log(
        &self,
        own: &ShapingProfile,
        peer: Option<&ShapingProfile>,
        saved_at: DateTime<Utc>,
    ) -> String {
        let mut out = vec![
            LOG_TITLE.to_owned(),
            format!(
                "Saved: {}",
                saved_at.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
            format!("Client: {}", self.client_name()),
            format!("Card: {}", self.source),
            format!("Pinged port: {}", self.target.peer),
        ];
        if let Some(peer) = peer {
            out.push(format!("Pinged port settings: {}", peer.settings_line()));
        }
        out.push(format!("Direction: {}", self.direction));
        out.push(format!("Target: {}", self.target.address));
        out.push(format!("Count: {}", self.mode.count_label()));
        out.push(format!("Settings: {}", own.settings_line()));
        out.push("---".into());
        out.extend(self.lines().iter().map(ToString::to_string));
        out.join("\n")
    }
}

// ── Run loop ─────────────────────────────────────────────────────────

struct ProbeRun {
    backend: Arc<dyn LabBackend>,
    source: PortKey,
    address: String,
    mode: ProbeMode,
    state: Arc<watch::Sender<ProbeState>>,
    lines: Arc<watch::Sender<Arc<Vec<ProbeLine>>>>,
    cancel: CancellationToken,
}

impl ProbeRun {
    async fn run(self) {
        match self.mode {
            ProbeMode::Single(count) => self.single(count).await,
            ProbeMode::Continuous => self.continuous().await,
        }
        self.state.send_replace(ProbeState::Stopped);
        debug!(source = %self.source, "probe stopped");
    }

    async fn single(&self, count: u32) {
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return,
            r = self.backend.run_probe(&self.source, &self.address, count) => r,
        };
        match result {
            Ok(out) => {
                let text = out.output.trim_end();
                if text.is_empty() {
                    self.push(ProbeLine::Raw {
                        text: format!("ping exited without output (ok={})", out.ok),
                    });
                }
                for line in text.lines() {
                    self.push(ProbeLine::Raw {
                        text: line.to_owned(),
                    });
                }
            }
            Err(e) => self.push(ProbeLine::Error {
                text: format!("Ping failed: {e}"),
            }),
        }
    }

    async fn continuous(&self) {
        while !self.cancel.is_cancelled() {
            match self.backend.run_probe(&self.source, &self.address, 1).await {
                Ok(out) => self.push(parse_probe_output(&out.output)),
                Err(e) => self.push(ProbeLine::Error {
                    text: format!("Ping error: {e}"),
                }),
            }
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(CONTINUOUS_PAUSE) => {}
            }
        }
    }

    fn push(&self, line: ProbeLine) {
        self.lines.send_modify(|lines| Arc::make_mut(lines).push(line));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REPLY: &str = "PING 10.0.0.1 (10.0.0.1): 56 data bytes\n\
        64 bytes from 10.0.0.1: seq=0 ttl=64 time=50.412 ms\n\
        \n\
        --- 10.0.0.1 ping statistics ---\n\
        1 packets transmitted, 1 packets received, 0% packet loss\n";

    fn session(direction: ProbeDirection, mode: ProbeMode) -> ProbeSession {
        let (source, peer) = match direction {
            ProbeDirection::ClientToServer => ("client1:eth0@if7", "lab_server:eth0"),
            ProbeDirection::ServerToClient => ("lab_server:eth0", "client1:eth0@if7"),
        };
        ProbeSession::new(
            source.parse().unwrap(),
            direction,
            mode,
            ProbeTarget {
                peer: peer.parse().unwrap(),
                address: "10.0.0.1".into(),
            },
        )
    }

    #[test]
    fn rtt_with_busybox_seq() {
        assert_eq!(
            parse_probe_output(REPLY),
            ProbeLine::Rtt {
                seq: Some(0),
                ms: "50.412".into()
            }
        );
        assert_eq!(parse_probe_output(REPLY).to_string(), "#0 50.412 ms");
    }

    #[test]
    fn rtt_with_iputils_icmp_seq_and_sub_ms() {
        let line = "64 bytes from 10.0.0.1: icmp_seq=7 ttl=64 TIME<1 ms";
        assert_eq!(parse_probe_output(line).to_string(), "#7 1 ms");
    }

    #[test]
    fn rtt_without_seq() {
        assert_eq!(parse_probe_output("reply time=3.2ms").to_string(), "3.2 ms");
    }

    #[test]
    fn no_rtt_falls_back_to_raw_output() {
        let out = "  ping: bad address 'nowhere'\n";
        assert_eq!(
            parse_probe_output(out),
            ProbeLine::Raw {
                text: "ping: bad address 'nowhere'".into()
            }
        );
        assert!(rtt_of("uptime=5 s").is_none());
        assert!(rtt_of("time= ms").is_none());
    }

    #[test]
    fn single_count_is_clamped() {
        assert_eq!(ProbeMode::single(0), ProbeMode::Single(1));
        assert_eq!(ProbeMode::single(4), ProbeMode::Single(4));
        assert_eq!(ProbeMode::single(99), ProbeMode::Single(10));
    }

    #[test]
    fn log_names_the_client_side() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:03:04.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let fwd = session(ProbeDirection::ClientToServer, ProbeMode::Continuous);
        assert_eq!(fwd.log_file_name(at), "ping-client1-20240501-120304.txt");
        let rev = session(ProbeDirection::ServerToClient, ProbeMode::single(4));
        assert_eq!(rev.client_name(), "client1");
    }

    #[test]
    fn export_log_header_layout() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:03:04Z")
            .unwrap()
            .with_timezone(&Utc);
        let s = session(ProbeDirection::ClientToServer, ProbeMode::single(4));
        let own = ShapingProfile {
            delay_ms: 50,
            loss_pct: 1.0,
            ..ShapingProfile::default()
        };
        let log = s.export_log(&own, Some(&ShapingProfile::default()), at);
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines[0], "WAN Lab Ping Log");
        assert_eq!(lines[1], "Saved: 2024-05-01T12:03:04.000Z");
        assert_eq!(lines[2], "Client: client1");
        assert_eq!(lines[3], "Card: client1:eth0@if7");
        assert_eq!(lines[4], "Pinged port: lab_server:eth0");
        assert!(lines[5].starts_with("Pinged port settings: delay=0ms"));
        assert_eq!(lines[6], "Direction: client-to-server");
        assert_eq!(lines[7], "Target: 10.0.0.1");
        assert_eq!(lines[8], "Count: 4");
        assert!(lines[9].starts_with("Settings: delay=50ms"));
        assert_eq!(lines[10], "---");
        assert_eq!(lines.len(), 11);
    }
}
