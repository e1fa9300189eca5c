// Processing module for record transforms
// Author: Gabriel Demetrios Lafis

mod config;
mod filter;
mod join;
mod aggregate;
mod normalize;
mod datetime;
mod json;

pub use config::*;
pub use filter::*;
pub use join::*;
pub use aggregate::*;
pub use normalize::*;
pub use datetime::*;
pub use json::*;

use log::{debug, info};
use thiserror::Error;

use crate::data::{DataError, Record};
use crate::utils::{EngineSettings, PipelineConfig, StageKind};

/// Represents a processor that transforms a batch of records
pub trait RecordProcessor {
    /// Process a batch and return a new batch
    fn process(&self, input: &[Record]) -> Result<Vec<Record>, ProcessingError>;

    /// Get the processor name
    fn name(&self) -> &str;

    /// Get the processor type
    fn processor_type(&self) -> ProcessorType;
}

/// Represents a processor type
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorType {
    Filter,
    Merge,
    Aggregate,
    Normalize,
    DateTime,
    Json,
    Custom(String),
}

/// Classification of processing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed configuration; the operator degrades gracefully
    Configuration,
    /// A single record failed; governed by the batch's error policy
    PerRecord,
    /// The whole batch call fails
    Fatal,
}

/// Represents an error in the processing module
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Record {record_id}: {message}")]
    Record { record_id: u64, message: String },

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl ProcessingError {
    /// Create a per-record error
    pub fn record<S: Into<String>>(record: &Record, message: S) -> Self {
        ProcessingError::Record {
            record_id: record.id(),
            message: message.into(),
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::Configuration(_) => ErrorKind::Configuration,
            ProcessingError::Record { .. } => ErrorKind::PerRecord,
            ProcessingError::Data(_) | ProcessingError::Fatal(_) => ErrorKind::Fatal,
        }
    }
}

/// Policy applied to records whose transform failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub include_on_error: bool,
}

impl ErrorPolicy {
    /// Create a new error policy
    pub fn new(include_on_error: bool) -> Self {
        ErrorPolicy { include_on_error }
    }

    /// Resolve a failed record: drop it, or keep it annotated with the error
    pub fn resolve(&self, mut record: Record, error: &ProcessingError) -> Option<Record> {
        if self.include_on_error {
            record.metadata.push_error(error.to_string());
            Some(record)
        } else {
            debug!("Dropping record {}: {}", record.id(), error);
            None
        }
    }
}

/// Pipeline for chaining multiple processors
pub struct Pipeline {
    name: String,
    processors: Vec<Box<dyn RecordProcessor>>,
}

impl Pipeline {
    /// Create a new pipeline with the given name
    pub fn new(name: &str) -> Self {
        Pipeline {
            name: name.to_string(),
            processors: Vec::new(),
        }
    }

    /// Build a pipeline from a declarative definition
    pub fn from_config(config: &PipelineConfig, settings: &EngineSettings) -> Self {
        let mut pipeline = Pipeline::new(&config.name);

        for stage in &config.stages {
            let inner: Box<dyn RecordProcessor> = match stage.kind {
                StageKind::Filter => Box::new(FilterProcessor::new()),
                StageKind::Merge => Box::new(MergeProcessor::with_settings(settings)),
                StageKind::Aggregate => Box::new(AggregateProcessor::new()),
                StageKind::Normalize => Box::new(NormalizeProcessor::new()),
                StageKind::DateTime => Box::new(DateTimeProcessor::with_settings(settings)),
                StageKind::Json => Box::new(JsonProcessor::with_settings(settings)),
            };

            pipeline.processors.push(Box::new(ConfiguredStage {
                key: stage.kind.metadata_key(),
                config: stage.config.clone(),
                inner,
            }));
        }

        pipeline
    }

    /// Add a processor to the pipeline
    pub fn add<P: RecordProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Get the number of stages
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Check if the pipeline has no stages
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Execute the pipeline on a batch
    pub fn execute(&self, input: &[Record]) -> Result<Vec<Record>, ProcessingError> {
        let mut current = input.to_vec();

        for processor in &self.processors {
            let before = current.len();
            current = processor.process(&current)?;
            info!(
                "Pipeline '{}' stage '{}': {} -> {} records",
                self.name,
                processor.name(),
                before,
                current.len()
            );
        }

        Ok(current)
    }
}

impl RecordProcessor for Pipeline {
    fn process(&self, input: &[Record]) -> Result<Vec<Record>, ProcessingError> {
        self.execute(input)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn processor_type(&self) -> ProcessorType {
        ProcessorType::Custom("Pipeline".to_string())
    }
}

/// Stage that attaches its configuration to the batch before running
struct ConfiguredStage {
    key: &'static str,
    config: serde_json::Value,
    inner: Box<dyn RecordProcessor>,
}

impl RecordProcessor for ConfiguredStage {
    fn process(&self, input: &[Record]) -> Result<Vec<Record>, ProcessingError> {
        let configured: Vec<Record> = input
            .iter()
            .map(|record| {
                let mut record = record.clone();
                record
                    .metadata
                    .set(self.key, crate::data::Value::Json(self.config.clone()));
                record
            })
            .collect();

        self.inner.process(&configured)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn processor_type(&self) -> ProcessorType {
        self.inner.processor_type()
    }
}
