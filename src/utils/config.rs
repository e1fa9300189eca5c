// Configuration utilities
// Author: Gabriel Demetrios Lafis

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::data::{
    AGGREGATION_CONFIG, DATETIME_CONFIG, FILTER_CONFIG, JSON_CONFIG, MERGE_CONFIG,
    NORMALIZATION_CONFIG,
};
use super::{parse_level, validate_field_name, AppError, AppResult};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

/// Engine-wide defaults applied when a batch does not override them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Prefix for right-side join fields whose name is already taken
    pub right_field_prefix: String,
    /// Separator used by `flatten` when the batch sets none
    pub flatten_separator: String,
    /// Keep failing records annotated instead of dropping them
    pub include_on_error: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Get the log level filter
    pub fn level_filter(&self) -> log::LevelFilter {
        parse_level(&self.level)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            right_field_prefix: "Right_".to_string(),
            flatten_separator: ".".to_string(),
            include_on_error: false,
        }
    }
}

/// Read a JSON or YAML file, chosen by extension
fn load_file<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> AppResult<T> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("json") => Ok(serde_json::from_str(&contents)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&contents)?),
        _ => Err(AppError::Config(format!(
            "unsupported config file format: {}",
            path.display()
        ))),
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Config = load_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the engine settings are usable
    pub fn validate(&self) -> AppResult<()> {
        validate_field_name(&self.engine.right_field_prefix)
            .map_err(|e| AppError::Config(format!("right_field_prefix: {}", e)))?;

        if self.engine.flatten_separator.is_empty() {
            return Err(AppError::Config("flatten_separator cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Get the log level filter
    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.logging.level_filter()
    }
}

/// Kind of a pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Filter,
    #[serde(alias = "join")]
    Merge,
    #[serde(alias = "aggregation")]
    Aggregate,
    #[serde(alias = "normalization")]
    Normalize,
    #[serde(alias = "temporal")]
    DateTime,
    Json,
}

impl StageKind {
    /// Metadata key the stage's configuration travels under
    pub fn metadata_key(&self) -> &'static str {
        match self {
            StageKind::Filter => FILTER_CONFIG,
            StageKind::Merge => MERGE_CONFIG,
            StageKind::Aggregate => AGGREGATION_CONFIG,
            StageKind::Normalize => NORMALIZATION_CONFIG,
            StageKind::DateTime => DATETIME_CONFIG,
            StageKind::Json => JSON_CONFIG,
        }
    }
}

/// One stage of a declarative pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub kind: StageKind,
    /// Operator configuration in its wire form
    #[serde(default)]
    pub config: JsonValue,
}

/// Declarative pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    /// Load a pipeline definition from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        load_file(path)
    }
}
