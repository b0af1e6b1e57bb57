// ── Command API ──
//
// Every mutation of the port table or the config store flows through a
// single `Command` enum. The controller's command processor handles them
// one at a time, so read-modify-write sequences never interleave. Reads
// bypass the channel.

use serde::Serialize;

use crate::backend::LabLayout;
use crate::error::CoreError;
use crate::model::{LabSnapshot, PortKey, PortView, Preset, PresetScope, ProfilePatch};
use crate::store::RefreshDiff;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All mutating operations on a session.
#[derive(Debug, Clone)]
pub enum Command {
    // ── Topology ─────────────────────────────────────────────────────
    /// Re-discover ports and merge them with custom and stored entries.
    Refresh,
    AddCustomPort {
        key: PortKey,
    },
    RemovePort {
        key: PortKey,
    },

    // ── Shaping ──────────────────────────────────────────────────────
    EditPort {
        key: PortKey,
        patch: ProfilePatch,
    },
    /// Push current profiles to the backend in one batch. `None` applies
    /// every port in the table.
    Apply {
        keys: Option<Vec<PortKey>>,
    },
    /// Overwrite the profile of every port in `scope`, then apply them.
    ApplyPreset {
        preset: Preset,
        scope: PresetScope,
    },

    // ── Snapshots ────────────────────────────────────────────────────
    SaveSnapshot {
        name: String,
    },
    /// Paint a snapshot onto matching ports, optionally applying them.
    LoadSnapshot {
        name: String,
        apply: bool,
    },
    DeleteSnapshot {
        name: String,
    },

    // ── Import / restore ─────────────────────────────────────────────
    /// Replace the stored mapping with an export document and paint it
    /// onto matching ports. With `restore`, the lab is re-created at the
    /// document's size first and the painted ports are applied.
    Import {
        text: String,
        restore: bool,
    },

    // ── Lab lifecycle ────────────────────────────────────────────────
    InitLab {
        ports: u32,
        recreate: bool,
    },
    DestroyLab,
}

/// Outcome of a command.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandResult {
    Ok,
    Refreshed(RefreshDiff),
    Port(PortView),
    Applied {
        count: usize,
    },
    Snapshot(LabSnapshot),
    /// Profiles painted onto current ports; `applied` is set when the
    /// painted ports were also pushed to the backend.
    Painted {
        painted: usize,
        applied: Option<usize>,
    },
    Imported {
        entries: usize,
        desired_ports: u32,
        painted: usize,
        applied: Option<usize>,
    },
    Lab(LabLayout),
}
