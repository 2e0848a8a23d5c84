//! # Similarity Pipeline
//!
//! Runs a full character similarity analysis in the background:
//!
//! 1. **Fetch**: one embedding per record, strictly sequentially
//! 2. **Compare**: uniqueness scores and the pairwise similarity matrix
//! 3. **Cluster**: threshold clustering of similar records
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Foreground                         Background (tokio task)     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  TaskRunner::start(RunRequest) ───► Worker::run                 │
//! │         ▲                               │                       │
//! │         │   Envelope{generation, msg}   │                       │
//! │  TaskRunner::next_message ◄─────────────┘                       │
//! │   (progress* then result | error)                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use charsim_pipeline::{AnalysisConfig, RunRequest, TaskRunner, WorkerMessage};
//!
//! let config = AnalysisConfig::new("http://127.0.0.1:5001").with_threshold(0.9);
//! let mut runner = TaskRunner::new();
//! runner.start(RunRequest::new(records, &config))?;
//!
//! while let Some(message) = runner.next_message().await {
//!     if let WorkerMessage::Progress { percent, message } = message {
//!         println!("{percent:.0}% {message}");
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod progress;
pub mod protocol;
pub mod runner;
mod worker;

pub use config::{AnalysisConfig, FetchFailurePolicy, RunOptions};
pub use error::{PipelineError, Result};
pub use protocol::{RunOutcome, RunRequest, WorkerMessage};
pub use runner::{TaskRunner, TaskState};

// Re-export from dependencies for convenience
pub use charsim_analysis::{Cluster, ClusterMember, PairSimilarity, Record, UniquenessScore};
pub use charsim_embeddings::{ApiFormat, ConnectionConfig, EmbeddingProvider};
