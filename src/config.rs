use serde::Deserialize;

use crate::domain::value_objects::ids::WorkerId;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub db: Db,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Db {
    pub url: String,
    pub max_connections: u32,
}

impl Default for Db {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/forge_delay".to_string(),
            max_connections: 5,
        }
    }
}

/// Worker tuning. Optional priority bounds default to unbounded.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerSettings {
    /// Worker identity; host name plus pid when unset.
    pub name: Option<String>,
    pub max_attempts: u32,
    pub max_run_time_seconds: u64,
    pub destroy_failed_jobs: bool,
    pub min_priority: Option<i32>,
    pub max_priority: Option<i32>,
    pub candidate_limit: usize,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            name: None,
            max_attempts: 25,
            max_run_time_seconds: 4 * 60 * 60,
            destroy_failed_jobs: true,
            min_priority: None,
            max_priority: None,
            candidate_limit: 5,
            batch_size: 100,
            poll_interval_ms: 5_000,
        }
    }
}

impl WorkerSettings {
    /// The configured worker name, else one derived from host and pid.
    pub fn worker_id(&self) -> WorkerId {
        self.name.clone().map(WorkerId).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load settings from `config/default.toml`, `config/<env>.toml`, and env overrides.
pub fn load() -> Result<Settings, config::ConfigError> {
    let env_name = std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
    config::Config::builder()
        .add_source(config::File::with_name("config/default"))
        .add_source(config::File::with_name(&format!("config/{env_name}")).required(false))
        .add_source(config::Environment::with_prefix("FORGE_DELAY").separator("__"))
        .build()?
        .try_deserialize()
}

/// Build settings from an inline TOML document. Missing keys take defaults.
pub fn from_toml_str(source: &str) -> Result<Settings, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::from_str(source, config::FileFormat::Toml))
        .build()?
        .try_deserialize()
}
