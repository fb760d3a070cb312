//! Configuration for the phxnet service.
//!
//! Layered TOML + environment loading, validation, and translation to
//! `phxnet_core::ServiceConfig`. The core never reads files; the binary
//! loads a [`Config`] here and hands the runtime half to the core.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use phxnet_core::ServiceConfig;

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

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Milliseconds between snapshot broadcasts.
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,

    /// Seconds after which a silent node or link renders as down.
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,

    /// Hours of IDS history shown in views.
    #[serde(default = "default_ids_retention_hours")]
    pub ids_retention_hours: u64,

    /// Notifications shown in the notifications view.
    #[serde(default = "default_notification_limit")]
    pub notification_limit: usize,

    /// Domain suffix stripped from hostnames in traffic charts.
    #[serde(default = "default_hostname_suffix")]
    pub hostname_suffix: String,

    /// Queued broadcasts per viewer before pushes are dropped.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Where viewers connect.
    #[serde(default = "default_viewer_bind")]
    pub viewer_bind: SocketAddr,

    /// One agent listener per VLAN.
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentListener>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broadcast_interval_ms: default_broadcast_interval_ms(),
            staleness_secs: default_staleness_secs(),
            ids_retention_hours: default_ids_retention_hours(),
            notification_limit: default_notification_limit(),
            hostname_suffix: default_hostname_suffix(),
            subscriber_buffer: default_subscriber_buffer(),
            viewer_bind: default_viewer_bind(),
            agents: default_agents(),
        }
    }
}

/// An agent-facing listener. Every agent connecting here reports on `vlan`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AgentListener {
    pub vlan: String,
    pub bind: SocketAddr,
}

fn default_broadcast_interval_ms() -> u64 {
    8000
}
fn default_staleness_secs() -> u64 {
    60
}
fn default_ids_retention_hours() -> u64 {
    720
}
fn default_notification_limit() -> usize {
    50
}
fn default_hostname_suffix() -> String {
    ".phxnet.org".into()
}
fn default_subscriber_buffer() -> usize {
    16
}
fn default_viewer_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}
fn default_agents() -> Vec<AgentListener> {
    vec![AgentListener {
        vlan: "default".into(),
        bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
    }]
}

// ── Validation and translation ──────────────────────────────────────

impl Config {
    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_interval_ms == 0 {
            return Err(invalid("broadcast_interval_ms", "must be greater than zero"));
        }
        if self.subscriber_buffer == 0 {
            return Err(invalid("subscriber_buffer", "must be greater than zero"));
        }
        if self.agents.is_empty() {
            return Err(invalid("agents", "at least one listener is required"));
        }

        let mut binds = HashSet::from([self.viewer_bind]);
        let mut vlans = HashSet::new();
        for listener in &self.agents {
            validate_vlan_name(&listener.vlan)?;
            if !vlans.insert(listener.vlan.as_str()) {
                return Err(invalid(
                    "agents.vlan",
                    format!("'{}' is configured twice", listener.vlan),
                ));
            }
            if !binds.insert(listener.bind) {
                return Err(invalid(
                    "agents.bind",
                    format!("{} is already in use by another listener", listener.bind),
                ));
            }
        }
        Ok(())
    }

    /// Runtime knobs for the core pipeline.
    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig {
            broadcast_interval: Duration::from_millis(self.broadcast_interval_ms),
            staleness: Duration::from_secs(self.staleness_secs),
            ids_retention: Duration::from_secs(self.ids_retention_hours.saturating_mul(3600)),
            notification_limit: self.notification_limit,
            hostname_suffix: self.hostname_suffix.clone(),
            subscriber_buffer: self.subscriber_buffer,
        }
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// VLAN names become store keys, which may not contain `.` or `$`.
pub fn validate_vlan_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(invalid("agents.vlan", "must not be empty"));
    }
    if name.contains(['.', '$']) {
        return Err(invalid(
            "agents.vlan",
            format!("'{name}' must not contain '.' or '$'"),
        ));
    }
    Ok(())
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "phxnet", "phxnet").map_or_else(
        || PathBuf::from("phxnet.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the platform config path (or `path` when given), then
/// `PHXNET_` environment variables. A missing file is not an error.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    load_from(&path)
}

/// Defaults, then the TOML file at `path`, then the environment.
/// Nested keys in the environment are split on `__`.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PHXNET_").split("__"))
        .extract()?;
    config.validate()?;
    Ok(config)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let file = write_config(
            r#"
broadcast_interval_ms = 2000
hostname_suffix = ".example.net"
viewer_bind = "127.0.0.1:5100"

[[agents]]
vlan = "substation"
bind = "0.0.0.0:8001"

[[agents]]
vlan = "office"
bind = "0.0.0.0:8002"
"#,
        );
        let config = load_from(file.path()).unwrap();

        assert_eq!(config.broadcast_interval_ms, 2000);
        assert_eq!(config.staleness_secs, 60);
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[1].vlan, "office");
        assert_eq!(config.viewer_bind, "127.0.0.1:5100".parse().unwrap());
    }

    #[test]
    fn explicit_path_wins_over_platform_default() {
        let file = write_config("notification_limit = 7\n");
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.notification_limit, 7);
    }

    #[test]
    fn translates_to_service_config() {
        let service = Config::default().to_service_config();
        assert_eq!(service, ServiceConfig::default());
    }

    #[test]
    fn rejects_zero_interval() {
        let config = Config {
            broadcast_interval_ms: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { field, .. }) if field == "broadcast_interval_ms"
        ));
    }

    #[test]
    fn rejects_bad_vlan_names() {
        for name in ["", "  ", "a.b", "cost$"] {
            assert!(validate_vlan_name(name).is_err(), "{name:?}");
        }
        assert!(validate_vlan_name("substation-7").is_ok());
    }

    #[test]
    fn rejects_duplicate_binds() {
        let file = write_config(
            r#"
viewer_bind = "0.0.0.0:9000"

[[agents]]
vlan = "a"
bind = "0.0.0.0:9000"
"#,
        );
        let err = load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("agents.bind"), "{err}");
    }

    #[test]
    fn rejects_duplicate_vlans() {
        let config = Config {
            agents: vec![
                AgentListener {
                    vlan: "a".into(),
                    bind: "0.0.0.0:8001".parse().unwrap(),
                },
                AgentListener {
                    vlan: "a".into(),
                    bind: "0.0.0.0:8002".parse().unwrap(),
                },
            ],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn renders_as_toml() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("broadcast_interval_ms = 8000"));
        assert!(rendered.contains("[[agents]]"));
    }
}
