//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::path::Path;

use wanlab_core::{Controller, PortKey};

use crate::error::CliError;

/// Resolve an operator-typed `name:iface` to the key the session knows,
/// matching scoped interface names (`eth0` finds `eth0@if7`).
pub async fn resolve_port(controller: &Controller, raw: &str) -> Result<PortKey, CliError> {
    Ok(controller.resolve_key(raw).await?)
}

/// Parse a key that need not exist yet.
pub fn parse_key(raw: &str) -> Result<PortKey, CliError> {
    raw.parse().map_err(|e: wanlab_core::model::ParsePortKeyError| CliError::Validation {
        field: "key".into(),
        reason: e.to_string(),
    })
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Read a document from `path`, or stdin for `-`.
pub fn read_text(path: &Path) -> Result<String, CliError> {
    if path.as_os_str() == "-" {
        return Ok(std::io::read_to_string(std::io::stdin())?);
    }
    Ok(std::fs::read_to_string(path)?)
}
