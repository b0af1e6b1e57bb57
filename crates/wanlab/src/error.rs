//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use wanlab_config::ConfigError;
use wanlab_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const BACKEND: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Backend request failed: {message}")]
    #[diagnostic(
        code(wanlab::backend_unreachable),
        help(
            "Check that the lab backend is running and reachable.\n\
             Try: wanlab lab status --backend http://<host>:8080"
        )
    )]
    Backend {
        message: String,
        status: Option<u16>,
    },

    #[error("Backend rejected the shaping batch: {message}")]
    #[diagnostic(
        code(wanlab::apply_failed),
        help("No port was changed. Fix the offending profile and apply again.")
    )]
    ApplyFailed { message: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(wanlab::not_found),
        help("Run: wanlab {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(wanlab::conflict))]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(wanlab::validation))]
    Validation { field: String, reason: String },

    #[error("Stored data is unreadable: {message}")]
    #[diagnostic(
        code(wanlab::malformed),
        help("Check the file contents; nothing was changed.")
    )]
    Malformed { message: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(wanlab::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Add one under [profiles.{name}] in the config file."
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(wanlab::no_config),
        help(
            "Pass --backend http://<host>:8080 or set WANLAB_BACKEND,\n\
             or create a profile in: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(wanlab::config))]
    Config(Box<figment::Error>),

    #[error("Keyring error: {message}")]
    #[diagnostic(code(wanlab::keyring))]
    Keyring { message: String },

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(wanlab::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Session ──────────────────────────────────────────────────────

    #[error("Session ended before the operation completed")]
    #[diagnostic(code(wanlab::session_closed))]
    SessionClosed,

    #[error("Internal error: {0}")]
    #[diagnostic(code(wanlab::internal))]
    Internal(String),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(wanlab::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Backend { status: None, .. } => exit_code::CONNECTION,
            Self::Backend { status: Some(_), .. } | Self::ApplyFailed { .. } => exit_code::BACKEND,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DuplicateKey { key } => CliError::Conflict {
                resource_type: "port".into(),
                identifier: key.to_string(),
            },

            CoreError::UnknownKey { key } => CliError::NotFound {
                resource_type: "port".into(),
                identifier: key,
                list_command: "ports list".into(),
            },

            CoreError::SnapshotNotFound { name } => CliError::NotFound {
                resource_type: "snapshot".into(),
                identifier: name,
                list_command: "snapshots list".into(),
            },

            CoreError::Transport { message, status } => CliError::Backend { message, status },

            CoreError::ApplyFailed { message } => CliError::ApplyFailed { message },

            CoreError::MalformedPersisted { message } => CliError::Malformed { message },

            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Storage { message } => CliError::Io(std::io::Error::other(message)),

            CoreError::SessionClosed => CliError::SessionClosed,

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
            ConfigError::Serialization(e) => CliError::Internal(e.to_string()),
        }
    }
}
