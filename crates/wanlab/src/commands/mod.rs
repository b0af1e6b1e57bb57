//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod config_cmd;
pub mod lab;
pub mod ports;
pub mod probe;
pub mod snapshots;
pub mod transfer;
pub mod util;
pub mod watch;

use wanlab_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Ports(args) => ports::handle(controller, args, global).await,
        Command::Lab(args) => lab::handle(controller, args, global).await,
        Command::Snapshots(args) => snapshots::handle(controller, args, global).await,
        Command::Export(args) => transfer::export(controller, args, global).await,
        Command::Import(args) => transfer::import(controller, args, global).await,
        Command::Probe(args) => probe::handle(controller, args, global).await,
        Command::Watch => watch::handle(controller, global).await,
        // Config and Completions are handled before a session is opened
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command does not run inside a session".into(),
        )),
    }
}
