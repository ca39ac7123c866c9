use std::path::PathBuf;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{log::LogLevel, notification::Priority};
use crate::store::SortKey;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub fcm_project_id: String,

    #[serde(default)]
    pub fcm_credentials_path: Option<PathBuf>,

    /// Override for emulator or test endpoints; the real backend otherwise.
    #[serde(default)]
    pub fcm_endpoint: Option<String>,

    pub database_url: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_threads_per_process")]
    pub threads_per_process: usize,

    #[serde(default)]
    pub default_priority: Priority,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default = "default_sending_order")]
    pub sending_order: Vec<SortKey>,

    #[serde(default)]
    pub template_engine: TemplateEngine,

    #[serde(default = "default_processes")]
    pub processes: usize,

    #[serde(default = "default_lockfile")]
    pub lockfile: PathBuf,

    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateEngine {
    #[default]
    Simple,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {e}"))?;
        Ok(config)
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_threads_per_process() -> usize {
    5
}

fn default_sending_order() -> Vec<SortKey> {
    vec![SortKey::descending_priority()]
}

fn default_processes() -> usize {
    1
}

fn default_lockfile() -> PathBuf {
    std::env::temp_dir().join("push_dispatch.lock")
}

fn default_retention_days() -> i64 {
    90
}
