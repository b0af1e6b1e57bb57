//! Live telemetry: print link counters as they change until interrupted.

use std::io::Write;

use owo_colors::OwoColorize;
use tabled::Tabled;
use wanlab_core::{Controller, PortKey, TelemetryRecord, TelemetrySnapshot};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output::{self, Printer, count};

#[derive(Tabled)]
struct TelemetryRow {
    #[tabled(rename = "Port")]
    key: String,
    #[tabled(rename = "Shaped")]
    active: String,
    #[tabled(rename = "Traffic")]
    traffic: String,
    #[tabled(rename = "Drops")]
    drops: String,
    #[tabled(rename = "Queue")]
    queue: String,
    #[tabled(rename = "Source")]
    source: String,
}

impl TelemetryRow {
    fn new(key: &PortKey, record: &TelemetryRecord, color: bool) -> Self {
        let s = &record.summary;
        let mut drops = format!("{} ({:.2}%)", count(s.drops_total), s.drop_pct);
        if record.reset_detected {
            drops.push_str(" reset");
        }
        let drops = if color && record.reset_detected {
            drops.yellow().to_string()
        } else if color && s.drops_total > 0 {
            drops.red().to_string()
        } else {
            drops
        };
        Self {
            key: key.to_string(),
            active: if s.active { "yes" } else { "no" }.into(),
            traffic: format!("{}B / {}f", count(s.tx_bytes), count(s.tx_frames)),
            drops,
            queue: format!("{}B / {}f", count(s.queue_bytes), count(s.queue_frames)),
            source: record.source.to_string(),
        }
    }
}

fn render(snapshot: &TelemetrySnapshot, format: &OutputFormat, color: bool) -> String {
    match format {
        OutputFormat::Table => {
            let rows: Vec<TelemetryRow> = snapshot
                .iter()
                .map(|(key, record)| TelemetryRow::new(key, record, color))
                .collect();
            output::table(&rows)
        }
        OutputFormat::Plain => snapshot
            .iter()
            .map(|(key, r)| {
                format!(
                    "{key} {} {} {}",
                    r.summary.tx_bytes, r.summary.tx_frames, r.summary.drops_total
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        // One document per update so the stream stays line-parseable.
        OutputFormat::Json | OutputFormat::JsonCompact => output::json_line(snapshot),
        OutputFormat::Yaml => format!("---\n{}", output::yaml(snapshot)),
    }
}

pub async fn handle(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let out = Printer::new(global);
    let color = output::color_enabled(&global.color);
    let mut telemetry_rx = controller.subscribe_telemetry();
    let mut state_rx = controller.subscribe_telemetry_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    out.note(&format!(
        "Watching link counters ({}), Ctrl-C to stop",
        *state_rx.borrow()
    ));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = telemetry_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = telemetry_rx.borrow_and_update().clone();
                if snapshot.is_empty() || global.quiet {
                    continue;
                }
                let text = render(&snapshot, &global.output, color);
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{text}")?;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                tracing::info!(%state, "telemetry state changed");
                out.note(&format!("telemetry: {state}"));
            }
        }
    }
    Ok(())
}
