//! Config subcommand handlers.

use secrecy::{ExposeSecret, SecretString};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, KEYRING_SERVICE, Profile};
use crate::error::CliError;
use crate::output::Printer;

// ── Helpers ─────────────────────────────────────────────────────────

fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    names.sort_unstable();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}

fn parse_field<T: std::str::FromStr>(
    field: &str,
    value: &str,
    expected: &str,
) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("must be {expected}"),
    })
}

/// Apply one `config set` assignment to a profile.
fn set_field(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key {
        "backend" => {
            url::Url::parse(&value).map_err(|e| CliError::Validation {
                field: "backend".into(),
                reason: format!("invalid URL: {e}"),
            })?;
            profile.backend = value;
        }
        "token_env" | "token-env" => profile.token_env = Some(value),
        "data_dir" | "data-dir" => profile.data_dir = Some(value.into()),
        "timeout" => profile.timeout = Some(parse_field(key, &value, "a number (seconds)")?),
        "poll_interval_ms" | "poll-interval-ms" => {
            let ms: u64 = parse_field(key, &value, "a number (milliseconds)")?;
            if ms == 0 {
                return Err(CliError::Validation {
                    field: "poll_interval_ms".into(),
                    reason: "must be greater than zero".into(),
                });
            }
            profile.poll_interval_ms = Some(ms);
        }
        "stream_enabled" | "stream-enabled" => {
            profile.stream_enabled = Some(parse_field(key, &value, "'true' or 'false'")?);
        }
        "ca_cert" | "ca-cert" => profile.ca_cert = Some(value.into()),
        "insecure" => profile.insecure = Some(parse_field(key, &value, "'true' or 'false'")?),
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: backend, token_env, data_dir, \
                     timeout, poll_interval_ms, stream_enabled, ca_cert, insecure"
                ),
            });
        }
    }
    Ok(())
}

fn keyring_err(e: keyring::Error) -> CliError {
    CliError::Keyring {
        message: e.to_string(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let out = Printer::new(global);
    match args.command {
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = config::load_config_or_default();
            for profile in cfg.profiles.values_mut() {
                if profile.token.is_some() {
                    profile.token = Some("****".into());
                }
            }
            out.item(
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("{c:#?} ({e})")),
                |_| "config".into(),
            );
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                out.note(&format!(
                    "No profiles configured. Add one under [profiles.<name>] in {}",
                    config::config_path().display()
                ));
            } else {
                let mut names: Vec<&String> = cfg.profiles.keys().collect();
                names.sort();
                for name in names {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            set_field(profile, &key, value)?;
            config::save_config(&cfg)?;
            out.note(&format!("Set {key} on profile '{profile_name}'"));
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: available_profiles(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            out.note(&format!("Default profile set to '{name}'"));
            Ok(())
        }

        ConfigCommand::SetToken { profile } => {
            let cfg = config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    available: available_profiles(&cfg),
                    name: profile_name,
                });
            }

            let token = SecretString::from(
                dialoguer::Password::new()
                    .with_prompt(format!("Token for '{profile_name}'"))
                    .interact()
                    .map_err(|e| CliError::Validation {
                        field: "interactive".into(),
                        reason: format!("prompt failed: {e}"),
                    })?,
            );
            if token.expose_secret().is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }

            let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
                .map_err(keyring_err)?;
            entry
                .set_password(token.expose_secret())
                .map_err(keyring_err)?;
            out.note(&format!(
                "Token stored in system keyring for '{profile_name}'"
            ));
            Ok(())
        }
    }
}
