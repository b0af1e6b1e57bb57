//! Port command handlers.

use tabled::Tabled;
use wanlab_core::{Command as CoreCommand, CommandResult, Controller, PortView, ProfilePatch};

use crate::cli::{EditArgs, GlobalOpts, OutputFormat, PortsArgs, PortsCommand};
use crate::error::CliError;
use crate::output::{Printer, count, dash};

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct PortRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Origin")]
    origin: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Delay")]
    delay: String,
    #[tabled(rename = "Jitter")]
    jitter: String,
    #[tabled(rename = "Loss")]
    loss: String,
    #[tabled(rename = "BER")]
    ber: String,
    #[tabled(rename = "Rate")]
    rate: String,
    #[tabled(rename = "Queue")]
    queue: String,
}

impl From<&PortView> for PortRow {
    fn from(v: &PortView) -> Self {
        let p = &v.profile;
        Self {
            key: v.key.to_string(),
            role: v.role.to_string(),
            origin: v.origin.to_string(),
            address: dash(v.address.as_deref()),
            delay: format!("{}ms", p.delay_ms),
            jitter: format!("{}ms", p.jitter_ms),
            loss: format!("{}%", p.loss_pct),
            ber: format!("{}%", p.ber_pct),
            rate: dash(p.rate.as_deref()),
            queue: dash(p.queue_limit),
        }
    }
}

fn detail(v: &PortView) -> String {
    let p = &v.profile;
    let mut lines = vec![
        format!("Key:       {}", v.key),
        format!("Role:      {}", v.role),
        format!("Origin:    {}", v.origin),
        format!("Address:   {}", v.address.as_deref().unwrap_or("-")),
        format!("MAC:       {}", v.mac.as_deref().unwrap_or("-")),
        format!("Delay:     {} ms (jitter {} ms)", p.delay_ms, p.jitter_ms),
        format!("Loss:      {}%", p.loss_pct),
        format!("BER:       {}%", p.ber_pct),
        format!("Rate:      {}", p.rate.as_deref().unwrap_or("unlimited")),
        format!("Queue:     {}", dash(p.queue_limit)),
        format!("Overhead:  {}", dash(p.overhead_bytes)),
        format!("MPU:       {}", p.min_packet_unit),
    ];
    if let Some(t) = &v.telemetry {
        let s = &t.summary;
        lines.push(format!(
            "Traffic:   {}B / {}f · drops {} ({:.2}%)",
            count(s.tx_bytes),
            count(s.tx_frames),
            count(s.drops_total),
            s.drop_pct
        ));
    }
    lines.join("\n")
}

fn edit_patch(args: &EditArgs) -> ProfilePatch {
    ProfilePatch {
        delay_ms: args.delay,
        jitter_ms: args.jitter,
        loss_pct: args.loss,
        ber_pct: args.ber,
        rate: args
            .rate
            .as_ref()
            .map(|r| Some(r.trim().to_owned()).filter(|r| !r.is_empty())),
        queue_limit: args.queue_limit.map(|q| (q > 0).then_some(q)),
        overhead_bytes: args.overhead.map(|o| (o > 0).then_some(o)),
        min_packet_unit: args.mpu,
    }
}

fn applied_message(result: &CommandResult) -> String {
    match result {
        CommandResult::Applied { count } => format!("Applied {count} port(s)"),
        _ => String::new(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &Controller,
    args: PortsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let out = Printer::new(global);
    match args.command {
        PortsCommand::List => {
            let ports = controller.ports().await;
            out.list(&ports, |v| PortRow::from(v), |v| v.key.to_string());
            Ok(())
        }

        PortsCommand::Get { key } => {
            let key = util::resolve_port(controller, &key).await?;
            let view = controller.port(&key).await?;
            out.item(&view, detail, |v| v.key.to_string());
            Ok(())
        }

        PortsCommand::Add { key } => {
            let key = util::parse_key(&key)?;
            let result = controller
                .execute(CoreCommand::AddCustomPort { key })
                .await?;
            if let CommandResult::Port(view) = result {
                out.item(&view, detail, |v| v.key.to_string());
            }
            Ok(())
        }

        PortsCommand::Remove { key } => {
            let key = util::parse_key(&key)?;
            controller
                .execute(CoreCommand::RemovePort { key: key.clone() })
                .await?;
            out.note(&format!("Removed {key}"));
            Ok(())
        }

        PortsCommand::Edit(edit) => {
            let patch = edit_patch(&edit);
            if patch.is_empty() {
                return Err(CliError::Validation {
                    field: "edit".into(),
                    reason: "nothing to change; pass at least one of --delay, --jitter, --loss, \
                             --ber, --rate, --queue-limit, --overhead, --mpu"
                        .into(),
                });
            }
            let key = util::resolve_port(controller, &edit.key).await?;
            let result = controller
                .execute(CoreCommand::EditPort {
                    key: key.clone(),
                    patch,
                })
                .await?;
            if edit.apply {
                let applied = controller
                    .execute(CoreCommand::Apply {
                        keys: Some(vec![key]),
                    })
                    .await?;
                out.note(&applied_message(&applied));
            }
            if let CommandResult::Port(view) = result {
                out.item(&view, detail, |v| v.key.to_string());
            }
            Ok(())
        }

        PortsCommand::Apply { keys } => {
            let keys = if keys.is_empty() {
                None
            } else {
                let mut resolved = Vec::with_capacity(keys.len());
                for raw in &keys {
                    resolved.push(util::resolve_port(controller, raw).await?);
                }
                Some(resolved)
            };
            let result = controller.execute(CoreCommand::Apply { keys }).await?;
            out.outcome(&result, &applied_message(&result));
            Ok(())
        }

        PortsCommand::Preset { preset, scope } => {
            let result = controller
                .execute(CoreCommand::ApplyPreset { preset, scope })
                .await?;
            let message = match out.format() {
                OutputFormat::Table => format!("{preset} on {scope}: {}", applied_message(&result)),
                _ => applied_message(&result),
            };
            out.outcome(&result, &message);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> EditArgs {
        EditArgs {
            key: "client1:eth0".into(),
            delay: None,
            jitter: None,
            loss: None,
            ber: None,
            rate: None,
            queue_limit: None,
            overhead: None,
            mpu: None,
            apply: false,
        }
    }

    #[test]
    fn empty_edit_is_empty_patch() {
        assert!(edit_patch(&args()).is_empty());
    }

    #[test]
    fn blank_rate_and_zero_queue_clear_fields() {
        let patch = edit_patch(&EditArgs {
            rate: Some("  ".into()),
            queue_limit: Some(0),
            delay: Some(50),
            ..args()
        });
        assert_eq!(patch.rate, Some(None));
        assert_eq!(patch.queue_limit, Some(None));
        assert_eq!(patch.delay_ms, Some(50));
    }
}
