//! Export and import handlers.

use std::io::Write;

use wanlab_core::{Command as CoreCommand, CommandResult, Controller};

use crate::cli::{ExportArgs, GlobalOpts, ImportArgs};
use crate::error::CliError;
use crate::output::Printer;

use super::util;

pub async fn export(
    controller: &Controller,
    args: ExportArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let doc = controller.export().await;
    let text = serde_json::to_string_pretty(&doc)?;

    match args.file.filter(|p| p.as_os_str() != "-") {
        Some(path) => {
            std::fs::write(&path, format!("{text}\n"))?;
            Printer::new(global).note(&format!(
                "Exported {} profile(s) to {}",
                doc.cfg.len(),
                path.display()
            ));
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{text}")?;
        }
    }
    Ok(())
}

fn imported_message(result: &CommandResult) -> String {
    match result {
        CommandResult::Imported {
            entries,
            desired_ports,
            painted,
            applied,
        } => {
            let mut msg = format!(
                "Imported {entries} profile(s) for a {desired_ports}-client lab, painted {painted}"
            );
            if let Some(applied) = applied {
                msg.push_str(&format!(", applied {applied}"));
            }
            msg
        }
        _ => String::new(),
    }
}

pub async fn import(
    controller: &Controller,
    args: ImportArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let text = util::read_text(&args.file)?;
    let result = controller
        .execute(CoreCommand::Import {
            text,
            restore: args.restore,
        })
        .await?;
    Printer::new(global).outcome(&result, &imported_message(&result));
    Ok(())
}
