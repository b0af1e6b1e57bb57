//! CLI configuration: a thin wrapper around `wanlab_config` shared types.
//!
//! Re-exports the shared types and adds CLI-specific resolution that
//! respects `GlobalOpts` flag overrides (--backend, --token, etc.).

use std::time::Duration;

use secrecy::SecretString;

use wanlab_core::{SessionConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use wanlab_config::{
    Config, KEYRING_SERVICE, Profile, config_path, load_config_or_default, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the session config from the config file, the active profile and
/// CLI overrides.
pub fn build_session_config(global: &GlobalOpts) -> Result<SessionConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        return resolve_profile(profile, &profile_name, global);
    }

    // A profile was asked for by name but does not exist.
    if global.profile.is_some() && global.backend.is_none() {
        let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
        available.sort_unstable();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    }

    // No profile: build from flags / env vars alone.
    let url_str = global.backend.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    let profile = Profile {
        backend: url_str.to_owned(),
        ..Profile::default()
    };
    resolve_profile(&profile, &profile_name, global)
}

/// Translate a `Profile` + global flags into a `SessionConfig`.
///
/// CLI flag overrides take priority over profile values.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<SessionConfig, CliError> {
    let mut config = wanlab_config::profile_to_session_config(profile, profile_name)?;

    // 1. Backend URL (flag > env > profile)
    if let Some(url_str) = global.backend.as_deref() {
        config.backend = url_str.parse().map_err(|_| CliError::Validation {
            field: "backend".into(),
            reason: format!("invalid URL: {url_str}"),
        })?;
    }

    // 2. Token (flag > profile chain)
    if let Some(ref token) = global.token {
        config.token = Some(SecretString::from(token.clone()));
    }

    // 3. TLS verification
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }

    // 4. Data directory
    if let Some(ref dir) = global.data_dir {
        config.data_dir = Some(dir.clone());
    }

    // 5. Timeout
    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs);
    }

    Ok(config)
}
