//! Shared configuration for the wanlab CLI.
//!
//! TOML profiles, data-directory resolution, token resolution
//! (env + keyring + plaintext), and translation to
//! `wanlab_core::SessionConfig`. The CLI layers its flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wanlab_core::{SessionConfig, TlsVerification};

/// Keyring service name; entries are keyed `<profile>/token`.
pub const KEYRING_SERVICE: &str = "wanlab";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named lab backend profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Backend base URL (e.g., "http://localhost:8080").
    pub backend: String,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Bearer token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the bearer token.
    pub token_env: Option<String>,

    /// Where port profiles and snapshots are kept. Defaults to the
    /// platform data dir joined with the profile name.
    pub data_dir: Option<PathBuf>,

    /// Status poll cadence while the telemetry stream is down.
    pub poll_interval_ms: Option<u64>,

    /// Set to `false` to never open the telemetry stream.
    pub stream_enabled: Option<bool>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept self-signed certificates.
    pub insecure: Option<bool>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "wanlab", "wanlab")
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".config", "wanlab", "config.toml"]),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Root of per-profile data directories.
pub fn data_root() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".local", "share", "wanlab"]),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

/// Data directory for one profile.
pub fn profile_data_dir(profile: &Profile, profile_name: &str) -> PathBuf {
    profile
        .data_dir
        .clone()
        .unwrap_or_else(|| data_root().join(profile_name))
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load defaults, then `path`, then `WANLAB_` variables (nested keys use
/// `__`, e.g. `WANLAB_DEFAULTS__OUTPUT=json`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("WANLAB_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution (without CLI flags) ────────────────────────────

/// Resolve the optional bearer token: env var named by `token_env`, then
/// the system keyring, then the plaintext `token` field.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token")) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    profile.token.clone().map(SecretString::from)
}

/// Build a `SessionConfig` from a profile, no CLI flag overrides.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<SessionConfig, ConfigError> {
    let url: url::Url = profile
        .backend
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "backend".into(),
            reason: format!("invalid URL: {}", profile.backend),
        })?;

    let mut config = SessionConfig::new(url);
    config.tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };
    if let Some(secs) = profile.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    config.token = resolve_token(profile, profile_name);
    config.data_dir = Some(profile_data_dir(profile, profile_name));
    if let Some(ms) = profile.poll_interval_ms {
        if ms == 0 {
            return Err(ConfigError::Validation {
                field: "poll_interval_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        config.poll_interval = Duration::from_millis(ms);
    }
    if let Some(enabled) = profile.stream_enabled {
        config.stream_enabled = enabled;
    }
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
default_profile = "bench"

[defaults]
output = "json"

[profiles.bench]
backend = "http://10.1.0.5:8080"
timeout = 5
data_dir = "/var/lib/wanlab/bench"
poll_interval_ms = 500
stream_enabled = false

[profiles.tls]
backend = "https://lab.example.net"
ca_cert = "/etc/wanlab/ca.pem"
"#;

    fn load(text: &str) -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, text).unwrap();
        load_config_from(&path).unwrap()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert_eq!(cfg.defaults.output, "table");
        assert_eq!(cfg.defaults.timeout, 30);
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn file_overrides_defaults() {
        let cfg = load(SAMPLE);
        assert_eq!(cfg.default_profile.as_deref(), Some("bench"));
        assert_eq!(cfg.defaults.output, "json");
        assert_eq!(cfg.defaults.color, "auto");
        assert_eq!(cfg.profiles.len(), 2);
    }

    #[test]
    fn profile_translates_to_session_config() {
        let cfg = load(SAMPLE);
        let session = profile_to_session_config(&cfg.profiles["bench"], "bench").unwrap();
        assert_eq!(session.backend.as_str(), "http://10.1.0.5:8080/");
        assert_eq!(session.timeout, Duration::from_secs(5));
        assert_eq!(session.poll_interval, Duration::from_millis(500));
        assert!(!session.stream_enabled);
        assert_eq!(
            session.data_dir.as_deref(),
            Some(Path::new("/var/lib/wanlab/bench"))
        );
        assert_eq!(session.tls, TlsVerification::SystemDefaults);

        let tls = profile_to_session_config(&cfg.profiles["tls"], "tls").unwrap();
        assert_eq!(
            tls.tls,
            TlsVerification::CustomCa(PathBuf::from("/etc/wanlab/ca.pem"))
        );
        assert!(tls.data_dir.unwrap().ends_with("tls"));
    }

    #[test]
    fn invalid_backend_url_is_rejected() {
        let profile = Profile {
            backend: "not a url".into(),
            ..Profile::default()
        };
        let err = profile_to_session_config(&profile, "x").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "backend"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let profile = Profile {
            backend: "http://localhost:8080".into(),
            poll_interval_ms: Some(0),
            ..Profile::default()
        };
        assert!(profile_to_session_config(&profile, "x").is_err());
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "lab".into(),
            Profile {
                backend: "http://127.0.0.1:8080".into(),
                stream_enabled: Some(true),
                ..Profile::default()
            },
        );
        save_config_to(&cfg, &path).unwrap();

        let back = load_config_from(&path).unwrap();
        assert_eq!(back.profiles["lab"].backend, "http://127.0.0.1:8080");
        assert_eq!(back.profiles["lab"].stream_enabled, Some(true));
    }
}
