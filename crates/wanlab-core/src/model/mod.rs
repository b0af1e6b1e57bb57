// ── Domain model ──

pub mod port;
pub mod profile;
pub mod snapshot;
pub mod telemetry;
pub mod view;

pub use port::{
    ParsePortKeyError, Port, PortKey, PortOrigin, PortRole, is_server_name, normalize_iface,
};
pub use profile::{DEFAULT_MPU, Preset, PresetScope, ProfilePatch, ShapingProfile};
pub use snapshot::{EXPORT_SCHEMA, ExportMeta, LabExport, LabImport, LabSnapshot, ProfileMap};
pub use telemetry::{TelemetryRecord, TelemetrySource, TelemetrySummary};
pub use view::PortView;
