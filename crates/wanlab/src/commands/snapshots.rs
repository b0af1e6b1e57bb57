//! Snapshot command handlers.

use chrono::SecondsFormat;
use tabled::Tabled;
use wanlab_core::{Command as CoreCommand, CommandResult, Controller, LabSnapshot};

use crate::cli::{GlobalOpts, SnapshotsArgs, SnapshotsCommand};
use crate::error::CliError;
use crate::output::Printer;

use super::util;

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Saved")]
    saved_at: String,
    #[tabled(rename = "Ports")]
    ports: usize,
}

impl From<&LabSnapshot> for SnapshotRow {
    fn from(s: &LabSnapshot) -> Self {
        Self {
            name: s.name.clone(),
            saved_at: s.saved_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ports: s.cfg.len(),
        }
    }
}

fn painted_message(result: &CommandResult) -> String {
    match result {
        CommandResult::Painted {
            painted,
            applied: Some(applied),
        } => format!("Painted {painted} port(s), applied {applied}"),
        CommandResult::Painted { painted, .. } => format!("Painted {painted} port(s)"),
        _ => String::new(),
    }
}

pub async fn handle(
    controller: &Controller,
    args: SnapshotsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let out = Printer::new(global);
    match args.command {
        SnapshotsCommand::List => {
            // A snapshot that no longer parses is skipped, not fatal.
            let snapshots: Vec<LabSnapshot> = controller
                .snapshots()
                .iter()
                .filter_map(|name| match controller.snapshot(name) {
                    Ok(s) => Some(LabSnapshot {
                        name: name.clone(),
                        ..s
                    }),
                    Err(e) => {
                        tracing::warn!(snapshot = %name, error = %e, "skipping unreadable snapshot");
                        None
                    }
                })
                .collect();
            out.list(&snapshots, |s| SnapshotRow::from(s), |s| s.name.clone());
            Ok(())
        }

        SnapshotsCommand::Save { name } => {
            let result = controller
                .execute(CoreCommand::SaveSnapshot { name: name.clone() })
                .await?;
            if let CommandResult::Snapshot(snapshot) = result {
                out.item(
                    &snapshot,
                    |s| format!("Saved snapshot '{name}' ({} port(s))", s.cfg.len()),
                    |_| name.clone(),
                );
            }
            Ok(())
        }

        SnapshotsCommand::Load { name, apply } => {
            let result = controller
                .execute(CoreCommand::LoadSnapshot { name, apply })
                .await?;
            out.outcome(&result, &painted_message(&result));
            Ok(())
        }

        SnapshotsCommand::Delete { name } => {
            if !util::confirm(
                &format!("Delete snapshot '{name}'?"),
                "snapshots delete",
                global.yes,
            )? {
                return Ok(());
            }
            controller
                .execute(CoreCommand::DeleteSnapshot { name: name.clone() })
                .await?;
            out.note(&format!("Deleted snapshot '{name}'"));
            Ok(())
        }
    }
}
