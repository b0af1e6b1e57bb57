//! Lab lifecycle command handlers.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use wanlab_core::{Command as CoreCommand, CommandResult, Controller, LabLayout};

use crate::cli::{GlobalOpts, LabArgs, LabCommand};
use crate::error::CliError;
use crate::output::{self, Printer};

use super::util;

fn layout_detail(layout: &LabLayout) -> String {
    let clients = layout.clients.iter().map(|c| format!("  {c}"));
    std::iter::once(format!(
        "Server:    {}",
        layout.server.as_deref().unwrap_or("-")
    ))
    .chain(std::iter::once(format!(
        "Clients:   {}",
        layout.clients.len()
    )))
    .chain(clients)
    .chain(std::iter::once(format!(
        "Networks:  {}",
        layout.networks.join(", ")
    )))
    .collect::<Vec<_>>()
    .join("\n")
}

fn spinner(message: String, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

pub async fn handle(
    controller: &Controller,
    args: LabArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let out = Printer::new(global);
    match args.command {
        LabCommand::Init { ports, recreate } => {
            let bar = spinner(format!("Creating lab with {ports} client(s)"), global.quiet);
            let result = controller
                .execute(CoreCommand::InitLab { ports, recreate })
                .await;
            bar.finish_and_clear();

            if let CommandResult::Lab(layout) = result? {
                out.item(&layout, layout_detail, |l| l.clients.join("\n"));
            }
            Ok(())
        }

        LabCommand::Destroy => {
            if !util::confirm(
                "Remove every lab container and network?",
                "lab destroy",
                global.yes,
            )? {
                return Ok(());
            }
            let bar = spinner("Destroying lab".into(), global.quiet);
            let result = controller.execute(CoreCommand::DestroyLab).await;
            bar.finish_and_clear();
            result?;
            out.note("Lab destroyed");
            Ok(())
        }

        LabCommand::Status => {
            let status = controller.lab_status().await?;
            out.item(&status, output::json_pretty, output::json_line);
            Ok(())
        }
    }
}
