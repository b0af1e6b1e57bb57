// ── Live telemetry ──

mod board;
mod reconciler;

pub use board::{TelemetryBoard, TelemetrySnapshot};
pub use reconciler::{ReconcilerConfig, ReconcilerState, TelemetryReconciler};
