//! Configuration for similarity analysis runs.

use charsim_analysis::{DEFAULT_EMBED_FIELDS, SortDirection};
use charsim_embeddings::ConnectionConfig;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Default clustering threshold on the `[0, 1]` similarity scale.
pub const DEFAULT_THRESHOLD: f32 = 0.95;

/// Lowest accepted clustering threshold.
pub const MIN_THRESHOLD: f32 = 0.5;

/// Highest accepted clustering threshold.
pub const MAX_THRESHOLD: f32 = 1.0;

/// Pairs compared between two progress messages.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 1000;

/// Most-similar pairs included in a result.
pub const DEFAULT_MAX_REPORTED_PAIRS: usize = 50;

/// What to do when fetching one record's embedding fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailurePolicy {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Log a warning and leave the record out.
    Skip,
}

/// Tuning knobs of a run that have sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    /// Record fields joined into the embedded text, in order.
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,

    /// Pairs compared between two progress messages.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Most-similar pairs included in the result.
    #[serde(default = "default_max_reported_pairs")]
    pub max_reported_pairs: usize,

    #[serde(default)]
    pub fetch_failure: FetchFailurePolicy,

    /// Order of the uniqueness scores in the result.
    #[serde(default)]
    pub uniqueness_order: SortDirection,
}

fn default_fields() -> Vec<String> {
    DEFAULT_EMBED_FIELDS.iter().map(ToString::to_string).collect()
}

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

fn default_max_reported_pairs() -> usize {
    DEFAULT_MAX_REPORTED_PAIRS
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fields: default_fields(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_reported_pairs: DEFAULT_MAX_REPORTED_PAIRS,
            fetch_failure: FetchFailurePolicy::default(),
            uniqueness_order: SortDirection::default(),
        }
    }
}

impl RunOptions {
    /// Check the options.
    pub fn validate(&self) -> Result<()> {
        if self.fields.iter().all(|f| f.trim().is_empty()) {
            return Err(PipelineError::Config(
                "at least one record field must be embedded".to_string(),
            ));
        }

        if self.progress_interval == 0 {
            return Err(PipelineError::Config(
                "progress interval must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Check a clustering threshold against the accepted range.
pub fn validate_threshold(threshold: f32) -> Result<()> {
    if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&threshold) {
        return Err(PipelineError::Config(format!(
            "threshold {threshold} is outside [{MIN_THRESHOLD}, {MAX_THRESHOLD}]"
        )));
    }
    Ok(())
}

/// Persisted analysis settings.
///
/// The host stores this as a flat key/value object; every key except
/// `endpointUrl` has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Embedding server connection.
    #[serde(flatten)]
    pub connection: ConnectionConfig,

    /// Clustering threshold on the `[0, 1]` scale.
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(flatten)]
    pub options: RunOptions,
}

impl AnalysisConfig {
    /// Create a configuration for the given endpoint with default settings.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            connection: ConnectionConfig::new(endpoint_url),
            threshold: DEFAULT_THRESHOLD,
            options: RunOptions::default(),
        }
    }

    /// Set the clustering threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the connection settings.
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Set the run options.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Parse settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::Config(format!("invalid settings: {e}")))
    }

    /// Check every setting, including that the endpoint resolves.
    pub fn validate(&self) -> Result<()> {
        self.connection
            .api_format
            .resolve_endpoint(&self.connection.endpoint_url)?;
        validate_threshold(self.threshold)?;
        self.options.validate()
    }
}
