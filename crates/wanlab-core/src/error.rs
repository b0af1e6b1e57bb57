// ── Core error types ──
//
// User-facing errors from wanlab-core. Consumers never see HTTP status
// codes or JSON parse failures directly: the `From<wanlab_api::Error>`
// impl folds every transport-layer failure into `Transport`.

use thiserror::Error;

use crate::model::PortKey;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Port model ───────────────────────────────────────────────────
    #[error("Port already exists: {key}")]
    DuplicateKey { key: PortKey },

    #[error("Unknown port: {key}")]
    UnknownKey { key: String },

    // ── Backend ──────────────────────────────────────────────────────
    #[error("Backend request failed: {message}")]
    Transport {
        message: String,
        /// HTTP status code (if the backend answered at all).
        status: Option<u16>,
    },

    #[error("Apply failed: {message}")]
    ApplyFailed { message: String },

    // ── Persistence ──────────────────────────────────────────────────
    #[error("Malformed persisted data: {message}")]
    MalformedPersisted { message: String },

    #[error("Snapshot not found: {name}")]
    SnapshotNotFound { name: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    // ── Session ──────────────────────────────────────────────────────
    #[error("Session is closed")]
    SessionClosed,

    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<wanlab_api::Error> for CoreError {
    fn from(err: wanlab_api::Error) -> Self {
        let status = match &err {
            wanlab_api::Error::Backend { status, .. } => Some(*status),
            wanlab_api::Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        };
        CoreError::Transport {
            message: err.to_string(),
            status,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Storage {
            message: err.to_string(),
        }
    }
}
