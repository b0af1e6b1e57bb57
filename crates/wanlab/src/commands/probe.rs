//! Probe command handler: run a ping from a port and stream its log.

use std::io::Write;
use std::path::Path;

use wanlab_core::{
    Controller, PortKey, PortRole, ProbeDirection, ProbeLine, ProbeMode, ProbeSession, ProbeState,
};

use crate::cli::{GlobalOpts, OutputFormat, ProbeArgs};
use crate::error::CliError;
use crate::output::Printer;

use super::util;

fn direction_from(role: PortRole) -> ProbeDirection {
    match role {
        PortRole::Client => ProbeDirection::ClientToServer,
        PortRole::Server => ProbeDirection::ServerToClient,
    }
}

fn opposite(direction: ProbeDirection) -> ProbeDirection {
    match direction {
        ProbeDirection::ClientToServer => ProbeDirection::ServerToClient,
        ProbeDirection::ServerToClient => ProbeDirection::ClientToServer,
    }
}

/// Pick the probing end: the port itself, or with `reverse` the peer it
/// would ping, probing back in the opposite direction.
async fn probe_origin(
    controller: &Controller,
    key: PortKey,
    reverse: bool,
) -> Result<(PortKey, ProbeDirection), CliError> {
    let direction = direction_from(key.role());
    if !reverse {
        return Ok((key, direction));
    }
    let target = controller
        .resolve_target(&key, direction)
        .await
        .ok_or_else(|| CliError::Validation {
            field: "reverse".into(),
            reason: format!("no peer with an address found for {key}"),
        })?;
    Ok((target.peer, opposite(direction)))
}

fn streams_text(format: &OutputFormat) -> bool {
    matches!(format, OutputFormat::Table | OutputFormat::Plain)
}

/// Print lines past `printed`, returning the new high-water mark.
fn print_new(lines: &[ProbeLine], printed: usize, quiet: bool) -> usize {
    if !quiet {
        let mut stdout = std::io::stdout().lock();
        for line in lines.iter().skip(printed) {
            let _ = writeln!(stdout, "{line}");
        }
    }
    lines.len()
}

/// Follow a probe until it stops. Ctrl-C requests a stop once; the run
/// ends at its next iteration boundary.
async fn follow(probe: &ProbeSession, echo: bool, quiet: bool) {
    let mut lines_rx = probe.subscribe_lines();
    let mut state_rx = probe.subscribe_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut printed = 0;

    loop {
        if echo {
            printed = print_new(&probe.lines(), printed, quiet);
        }
        if probe.state() == ProbeState::Stopped {
            break;
        }
        tokio::select! {
            changed = lines_rx.changed() => {
                if changed.is_err() { break; }
            }
            changed = state_rx.changed() => {
                if changed.is_err() { break; }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::debug!("interrupt received, stopping probe");
                probe.stop().await;
            }
        }
    }

    probe.wait().await;
    if echo {
        print_new(&probe.lines(), printed, quiet);
    }
}

fn write_log(path: &Path, file_name: &str, text: &str) -> Result<std::path::PathBuf, CliError> {
    let dest = if path.is_dir() {
        path.join(file_name)
    } else {
        path.to_path_buf()
    };
    std::fs::write(&dest, format!("{text}\n"))?;
    Ok(dest)
}

pub async fn handle(
    controller: &Controller,
    args: ProbeArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let key = util::resolve_port(controller, &args.key).await?;
    let (source, direction) = probe_origin(controller, key, args.reverse).await?;
    let mode = if args.continuous {
        ProbeMode::Continuous
    } else {
        ProbeMode::single(args.count)
    };

    let out = Printer::new(global);
    let probe = controller.start_probe(&source, direction, mode).await?;
    out.note(&format!(
        "Probing {} from {} ({direction})",
        probe.target().address,
        probe.source()
    ));

    let echo = streams_text(out.format());
    follow(&probe, echo, global.quiet).await;

    if !echo {
        out.item(probe.lines().as_slice(), |_| String::new(), |_| String::new());
    }

    if let Some(path) = args.save_log {
        let (file_name, text) = controller
            .export_probe_log(probe.source(), direction)
            .await?;
        let dest = write_log(&path, &file_name, &text)?;
        out.note(&format!("Saved log to {}", dest.display()));
    }
    Ok(())
}
