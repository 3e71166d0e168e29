//! Engine configuration, layered defaults -> file -> environment.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub engine: EngineSettings,
    pub readers: ReadersConfig,
    pub smtp: SmtpConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_subscribe_patterns")]
    pub subscribe_patterns: Vec<String>,
}

/// Knobs specific to the rule/report engine itself, not its
/// collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Publisher identifier stamped on engine-originated messages.
    #[serde(default = "default_publisher_id")]
    pub publisher_id: String,

    /// Lower bound of the window the Report Generator reads from.
    #[serde(default = "default_reports_epoch")]
    pub reports_epoch: DateTime<Utc>,

    /// Scheduler tick interval.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Capacity of the bounded error channel shared by executor,
    /// report generator, and scheduler loop tasks.
    #[serde(default = "default_error_channel_capacity")]
    pub error_channel_capacity: usize,

    /// Wall-clock budget given to a single script evaluation.
    #[serde(default = "default_script_timeout_ms")]
    pub script_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadersConfig {
    #[serde(default = "default_readers_url")]
    pub base_url: String,

    #[serde(default = "default_readers_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_smtp_from")]
    pub from_address: String,
}

impl Config {
    /// Load configuration, layering an optional YAML file over the
    /// built-in defaults, then environment variables (prefixed
    /// `RULEENGINE_`, nested fields separated by `__`) over both.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path.as_ref()));
        }

        figment = figment.merge(Env::prefixed("RULEENGINE_").split("__"));

        figment.extract().map_err(EngineError::from)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service: ServiceConfig {
                name: default_service_name(),
            },
            database: DatabaseConfig {
                path: default_database_path(),
            },
            redis: RedisConfig {
                url: default_redis_url(),
                key_prefix: default_key_prefix(),
                subscribe_patterns: default_subscribe_patterns(),
            },
            engine: EngineSettings {
                publisher_id: default_publisher_id(),
                reports_epoch: default_reports_epoch(),
                tick_ms: default_tick_ms(),
                error_channel_capacity: default_error_channel_capacity(),
                script_timeout_ms: default_script_timeout_ms(),
            },
            readers: ReadersConfig {
                base_url: default_readers_url(),
                timeout_secs: default_readers_timeout_secs(),
            },
            smtp: SmtpConfig {
                host: default_smtp_host(),
                port: default_smtp_port(),
                username: None,
                password: None,
                from_address: default_smtp_from(),
            },
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "ruleengine".to_string()
}

fn default_database_path() -> String {
    "ruleengine.db".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "re:".to_string()
}

fn default_subscribe_patterns() -> Vec<String> {
    vec!["channels.*".to_string()]
}

fn default_publisher_id() -> String {
    "magistrala.re".to_string()
}

fn default_reports_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_else(Utc::now)
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_error_channel_capacity() -> usize {
    256
}

fn default_script_timeout_ms() -> u64 {
    5000
}

fn default_readers_url() -> String {
    "http://localhost:9011".to_string()
}

fn default_readers_timeout_secs() -> u64 {
    10
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_smtp_from() -> String {
    "no-reply@magistrala.local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_have_sane_values() {
        let cfg = Config::default();
        assert_eq!(cfg.engine.publisher_id, "magistrala.re");
        assert_eq!(cfg.engine.reports_epoch.timestamp(), 1_735_689_600);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn load_without_file_returns_defaults() {
        let cfg = Config::load::<&str>(None).expect("defaults must load");
        assert_eq!(cfg.service.name, "ruleengine");
    }

    #[test]
    fn load_merges_yaml_file_over_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "service:\n  name: custom-engine\nlog_level: debug\n").unwrap();

        let cfg = Config::load(Some(&path)).expect("file must load");
        assert_eq!(cfg.service.name, "custom-engine");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.engine.publisher_id, "magistrala.re");
    }
}
