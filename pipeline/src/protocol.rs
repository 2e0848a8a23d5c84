//! Messages exchanged with the background worker.

use charsim_analysis::{Cluster, PairSimilarity, Record, UniquenessScore};
use charsim_embeddings::ConnectionConfig;
use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, RunOptions, validate_threshold};
use crate::error::Result;

/// Everything a worker needs for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Records to analyse, in display order.
    pub records: Vec<Record>,

    /// Embedding server connection.
    pub config: ConnectionConfig,

    /// Clustering threshold on the `[0, 1]` scale.
    pub threshold: f32,

    #[serde(default)]
    pub options: RunOptions,
}

impl RunRequest {
    /// Build a request from persisted settings.
    pub fn new(records: Vec<Record>, config: &AnalysisConfig) -> Self {
        Self {
            records,
            config: config.connection.clone(),
            threshold: config.threshold,
            options: config.options.clone(),
        }
    }

    /// Check threshold and options. Endpoint validation happens when the
    /// client is built.
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.threshold)?;
        self.options.validate()
    }
}

/// Final payload of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Distance of every embedded record from the global centroid.
    pub uniqueness: Vec<UniquenessScore>,

    /// Similarity clusters, most distinctive first.
    pub clusters: Vec<Cluster>,

    /// Most similar pairs, most similar first.
    #[serde(default)]
    pub pairs: Vec<PairSimilarity>,
}

/// A message from the worker to the foreground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Intermediate progress, `percent` never decreases within a run.
    Progress { percent: f32, message: String },

    /// Last message of a successful run.
    Result(RunOutcome),

    /// Last message of a failed run.
    Error { kind: String, message: String },
}

impl WorkerMessage {
    /// Build a progress update.
    pub fn progress(percent: f32, message: impl Into<String>) -> Self {
        Self::Progress {
            percent,
            message: message.into(),
        }
    }

    /// Build a failure message from an error kind and description.
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Whether this message ends a run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// A worker message tagged with the run it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Envelope {
    pub generation: u64,
    pub message: WorkerMessage,
}
