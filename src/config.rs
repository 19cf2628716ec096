//! Layered application configuration
//!
//! Sources, lowest priority first: built-in defaults, one optional file
//! (YAML or JSON), then `SKUFLOW__SECTION__KEY` environment variables.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use action_flow::EngineConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use skuflow_scheduler::{PollConfig, SchedulerConfig};
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "SKUFLOW";
const LOCAL_CONFIG: &str = "config/skuflow.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub engine: EngineConfig,
    pub driver: DriverConfig,
    pub poll: PollConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Base URL clients use to reach this server.
    pub fn base_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" => "127.0.0.1",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }
}

/// Page model used when no browser is attached
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// JSON/YAML page fixture for the scripted driver
    pub fixture: Option<PathBuf>,
}

pub struct LoadedConfig {
    pub config: AppConfig,
    /// File the configuration was read from, if any
    pub path: Option<PathBuf>,
}

/// Resolve and merge every configuration layer.
///
/// An explicit `path` must exist. Without one, `config/skuflow.yaml` and then
/// `<config dir>/skuflow/config.yaml` are tried.
pub fn load(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let file = match path {
        Some(path) => Some(path.to_path_buf()),
        None => default_candidates().into_iter().find(|candidate| candidate.exists()),
    };

    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);
    if let Some(file) = &file {
        builder = builder.add_source(File::from(file.as_path()).required(true));
        info!(path = %file.display(), "loading configuration file");
    } else {
        debug!("no configuration file found, using defaults");
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?.try_deserialize::<AppConfig>()?;
    Ok(LoadedConfig { config, path: file })
}

fn default_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("skuflow");
        dir.push("config.yaml");
        candidates.push(dir);
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_yaml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn defaults_match_polling_discipline() {
        let config = AppConfig::default();
        assert_eq!(config.poll.interval_ms, 10_000);
        assert_eq!(config.poll.max_polls, 30);
        assert_eq!(config.poll.max_transient_errors, 10);
        assert_eq!(config.server.base_url(), "http://127.0.0.1:8787");
    }

    #[test]
    #[serial]
    fn file_overrides_defaults_and_keeps_the_rest() {
        let file = write_yaml(
            "server:\n  port: 9000\nscheduler:\n  max_running_jobs: 2\nengine:\n  flow_timeout_ms: 5000\n",
        );
        let loaded = load(Some(file.path())).unwrap();

        assert_eq!(loaded.path.as_deref(), Some(file.path()));
        assert_eq!(loaded.config.server.port, 9000);
        assert_eq!(loaded.config.server.host, "127.0.0.1");
        assert_eq!(loaded.config.scheduler.max_running_jobs, 2);
        assert_eq!(loaded.config.scheduler.unit_concurrency, 4);
        assert_eq!(loaded.config.engine.flow_timeout_ms, Some(5000));
        assert_eq!(loaded.config.poll, PollConfig::default());
    }

    #[test]
    #[serial]
    fn environment_wins_over_file() {
        let file = write_yaml("server:\n  port: 9000\n");
        std::env::set_var("SKUFLOW__SERVER__PORT", "9100");
        std::env::set_var("SKUFLOW__POLL__MAX_POLLS", "5");
        let loaded = load(Some(file.path()));
        std::env::remove_var("SKUFLOW__SERVER__PORT");
        std::env::remove_var("SKUFLOW__POLL__MAX_POLLS");

        let config = loaded.unwrap().config;
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.poll.max_polls, 5);
    }

    #[test]
    #[serial]
    fn explicit_missing_file_is_an_error() {
        assert!(load(Some(Path::new("/nonexistent/skuflow.yaml"))).is_err());
    }
}
