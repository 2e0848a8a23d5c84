//! # Analysis
//!
//! Turns a set of character embeddings into uniqueness rankings and
//! similarity clusters.
//!
//! ```text
//! Record ──► EmbeddingSet ──► centroid ──► UniquenessScore[]
//!                 │
//!                 └──► SimilarityMatrix ──► ClusteringEngine ──► Cluster[]
//! ```
//!
//! Similarities are stored as raw cosine values in `[-1, 1]`; the
//! clustering threshold is expressed on the rescaled `[0, 1]` scale.

pub mod cluster;
pub mod record;
pub mod set;
pub mod similarity;

pub use cluster::{Cluster, ClusterMember, ClusteringEngine};
pub use record::{DEFAULT_EMBED_FIELDS, Record};
pub use set::EmbeddingSet;
pub use similarity::{
    PairSimilarity, SimilarityMatrix, SortDirection, UniquenessScore, compute_centroid,
    compute_pairwise_matrix, compute_uniqueness, rank_uniqueness,
};
