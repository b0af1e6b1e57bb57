//! Session layer between `wanlab-api` and the CLI.
//!
//! This crate owns the port model, persistence, and the background tasks
//! of one operator session against a WAN lab backend:
//!
//! - **[`Controller`]**: central facade. [`open()`](Controller::open)
//!   starts the command processor, discovers ports and starts telemetry;
//!   [`Controller::oneshot()`](Controller::oneshot) runs a single CLI
//!   invocation without background telemetry.
//!
//! - **[`PortTable`]** / **[`ConfigStore`]**: the in-memory port registry
//!   keyed by [`PortKey`] identity, and the blob-backed store for profiles,
//!   custom ports and named snapshots.
//!
//! - **[`TelemetryReconciler`]**: keeps a [`TelemetryBoard`] current from
//!   the push stream, falling back to status polling while the stream is
//!   down.
//!
//! - **[`ProbeSession`]**: single or continuous ping runs between a port
//!   and its resolved peer.
//!
//! - **[`Command`]**: typed mutations routed through an `mpsc` channel to
//!   the controller's command processor. Reads bypass the channel.
//!
//! - **[`LabBackend`]**: the seam to the shaping backend; [`HttpBackend`]
//!   is the production implementation.

pub mod addr;
pub mod backend;
pub mod command;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod model;
pub mod probe;
pub mod resolver;
pub mod store;
pub mod telemetry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::{HttpBackend, LabBackend, LabLayout, ProbeOutput, TelemetryBatch, TelemetryStream};
pub use command::{Command, CommandResult};
pub use config::{SessionConfig, TlsVerification};
pub use controller::{Controller, LAB_PORT_RANGE, SessionState};
pub use error::CoreError;
pub use probe::{ProbeDirection, ProbeLine, ProbeMode, ProbeSession, ProbeState};
pub use resolver::ProbeTarget;
pub use store::{
    BlobStore, ConfigStore, FileBlobStore, MemoryBlobStore, PortEntry, PortTable, RefreshDiff,
};
pub use telemetry::{
    ReconcilerConfig, ReconcilerState, TelemetryBoard, TelemetryReconciler, TelemetrySnapshot,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    LabExport, LabImport, LabSnapshot, Port, PortKey, PortOrigin, PortRole, PortView, Preset,
    PresetScope, ProfileMap, ProfilePatch, ShapingProfile, TelemetryRecord, TelemetrySource,
    TelemetrySummary,
};
