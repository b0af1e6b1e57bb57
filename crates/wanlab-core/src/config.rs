// ── Runtime session configuration ──
//
// Describes *how* to talk to a lab backend and where to keep local state.
// Never touches config files: the CLI builds a `SessionConfig` and hands
// it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use wanlab_api::{TlsMode, TransportConfig};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed lab hosts).
    DangerAcceptInvalid,
}

/// Configuration for one controller session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backend base URL (e.g., `http://localhost:8080`).
    pub backend: Url,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Optional bearer token.
    pub token: Option<SecretString>,
    /// Where profiles and snapshots are persisted. `None` keeps them in
    /// memory for the lifetime of the session.
    pub data_dir: Option<PathBuf>,
    /// Status poll cadence while the stream is down.
    pub poll_interval: Duration,
    /// Open the push stream at all.
    pub stream_enabled: bool,
    /// Run the telemetry reconciler on `open()`.
    pub telemetry_enabled: bool,
}

impl SessionConfig {
    pub fn new(backend: Url) -> Self {
        Self {
            backend,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            token: None,
            data_dir: None,
            poll_interval: Duration::from_secs(2),
            stream_enabled: true,
            telemetry_enabled: true,
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
            token: self.token.clone(),
        }
    }
}
