//! Threshold clustering over a [`SimilarityMatrix`].
//!
//! Two records are linked when their rescaled similarity reaches the
//! threshold; clusters are the connected components of that graph with at
//! least two members.

use std::cmp::Reverse;
use std::collections::HashMap;

use charsim_embeddings::similarity::{average, l1_distance, rescale_similarity};
use charsim_embeddings::{Embedding, EmbeddingError, Result};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::set::EmbeddingSet;
use crate::similarity::SimilarityMatrix;

/// Disjoint-set forest with path compression and union by rank.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }

        root
    }

    fn union(&mut self, x: usize, y: usize) {
        let rx = self.find(x);
        let ry = self.find(y);

        if rx == ry {
            return;
        }

        match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => self.parent[rx] = ry,
            std::cmp::Ordering::Greater => self.parent[ry] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }
    }

    /// Sets with more than one element, each listed in index order and
    /// ordered by their smallest index.
    fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut slots: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for i in 0..self.parent.len() {
            let root = self.find(i);
            let slot = *slots.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(i);
        }

        groups.retain(|members| members.len() > 1);
        groups
    }
}

/// A member of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMember {
    /// Record id.
    pub id: String,

    /// L1 distance from the cluster centroid.
    pub local_distance: f32,
}

/// A group of records linked by similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// L1 distance of the cluster centroid from the global centroid.
    #[serde(rename = "clusterUniqueness")]
    pub uniqueness: f32,

    /// Most representative member first.
    pub members: Vec<ClusterMember>,

    #[serde(skip)]
    pub centroid: Embedding,
}

impl Cluster {
    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the cluster has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m.id == id)
    }
}

/// Groups records whose similarity clears a threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusteringEngine {
    threshold: f32,
}

impl ClusteringEngine {
    /// `threshold` is in the rescaled `[0, 1]` similarity convention.
    pub fn new(threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(EmbeddingError::Configuration(format!(
                "cluster threshold {threshold} is outside [0, 1]"
            )));
        }
        Ok(Self { threshold })
    }

    /// Threshold on the rescaled `[0, 1]` scale.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether a raw cosine similarity links two records.
    pub fn links(&self, similarity: f32) -> bool {
        rescale_similarity(similarity) >= self.threshold
    }

    /// Connected components of the threshold graph, as record indices.
    ///
    /// Members are in index order; components are ordered by their first member.
    pub fn components(&self, matrix: &SimilarityMatrix) -> Vec<Vec<usize>> {
        let mut forest = UnionFind::new(matrix.size());
        for (i, j, similarity) in matrix.pairs() {
            if self.links(similarity) {
                forest.union(i, j);
            }
        }
        forest.groups()
    }

    /// Build scored clusters.
    ///
    /// Members are sorted by ascending local distance, clusters by
    /// descending uniqueness; both sorts are stable.
    pub fn cluster(
        &self,
        set: &EmbeddingSet,
        matrix: &SimilarityMatrix,
        global_centroid: &[f32],
    ) -> Result<Vec<Cluster>> {
        if matrix.size() != set.len() {
            return Err(EmbeddingError::ShapeMismatch {
                expected: set.len(),
                actual: matrix.size(),
            });
        }

        let vectors = set.vectors();
        let mut clusters = Vec::new();

        for component in self.components(matrix) {
            let member_vectors: Vec<&Embedding> = component.iter().map(|&i| &vectors[i]).collect();
            let centroid = average(&member_vectors)?;
            let uniqueness = l1_distance(&centroid, global_centroid)?;

            let mut members = component
                .iter()
                .map(|&i| {
                    Ok(ClusterMember {
                        id: set.ids()[i].clone(),
                        local_distance: l1_distance(&vectors[i], &centroid)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            members.sort_by_key(|m| OrderedFloat(m.local_distance));

            clusters.push(Cluster {
                uniqueness,
                members,
                centroid,
            });
        }

        clusters.sort_by_key(|c| Reverse(OrderedFloat(c.uniqueness)));

        debug!(
            "Found {} clusters at threshold {}",
            clusters.len(),
            self.threshold
        );

        Ok(clusters)
    }
}
