//! Centroid, uniqueness and pairwise similarity over an [`EmbeddingSet`].

use std::cmp::Reverse;
use std::ops::ControlFlow;

use charsim_embeddings::similarity::{average, cosine_similarity, l1_distance};
use charsim_embeddings::{Embedding, EmbeddingError, Result};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::set::EmbeddingSet;

/// How far a record's embedding sits from a centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniquenessScore {
    /// Record id.
    pub id: String,

    /// L1 distance from the centroid. Higher is more distinct.
    pub score: f32,
}

/// Sort direction for uniqueness rankings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Most unique first.
    #[default]
    Descending,
    /// Most typical first.
    Ascending,
}

/// Similarity of one unordered pair of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSimilarity {
    pub a: String,
    pub b: String,

    /// Raw cosine similarity in `[-1, 1]`.
    pub similarity: f32,
}

/// Per-dimension mean of every embedding in the set.
pub fn compute_centroid(set: &EmbeddingSet) -> Result<Embedding> {
    if set.is_empty() {
        return Err(EmbeddingError::EmptyInput(
            "no embeddings to compute a centroid from".to_string(),
        ));
    }
    average(set.vectors())
}

/// L1 distance of every embedding from `centroid`, in set order.
pub fn compute_uniqueness(set: &EmbeddingSet, centroid: &[f32]) -> Result<Vec<UniquenessScore>> {
    set.iter()
        .map(|(id, embedding)| {
            Ok(UniquenessScore {
                id: id.to_string(),
                score: l1_distance(embedding, centroid)?,
            })
        })
        .collect()
}

/// Stable sort of uniqueness scores.
pub fn rank_uniqueness(scores: &mut [UniquenessScore], direction: SortDirection) {
    match direction {
        SortDirection::Descending => scores.sort_by_key(|s| Reverse(OrderedFloat(s.score))),
        SortDirection::Ascending => scores.sort_by_key(|s| OrderedFloat(s.score)),
    }
}

/// Upper triangle of the symmetric cosine similarity matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    size: usize,
    values: Vec<f32>,
}

impl SimilarityMatrix {
    /// Number of unordered pairs for `size` records.
    pub fn pair_count(size: usize) -> usize {
        size * size.saturating_sub(1) / 2
    }

    /// Number of records (rows) in the matrix.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn offset(&self, i: usize, j: usize) -> usize {
        // Rows before `i` hold (size-1) + (size-2) + ... + (size-i) entries.
        i * (2 * self.size - i - 1) / 2 + (j - i - 1)
    }

    /// Similarity between records `i` and `j`. `None` on the diagonal or out of range.
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        if lo == hi || hi >= self.size {
            return None;
        }
        self.values.get(self.offset(lo, hi)).copied()
    }

    /// Every `(i, j, similarity)` with `i < j`, row by row.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        let size = self.size;
        (0..size)
            .flat_map(move |i| (i + 1..size).map(move |j| (i, j)))
            .zip(self.values.iter().copied())
            .map(|((i, j), similarity)| (i, j, similarity))
    }

    /// The `limit` most similar pairs, most similar first.
    pub fn top_pairs(&self, set: &EmbeddingSet, limit: usize) -> Vec<PairSimilarity> {
        let mut pairs: Vec<(usize, usize, f32)> = self.pairs().collect();
        pairs.sort_by_key(|&(_, _, similarity)| Reverse(OrderedFloat(similarity)));

        pairs
            .into_iter()
            .take(limit)
            .filter_map(|(i, j, similarity)| {
                Some(PairSimilarity {
                    a: set.id(i)?.to_string(),
                    b: set.id(j)?.to_string(),
                    similarity,
                })
            })
            .collect()
    }
}

/// Compute cosine similarity for every unordered pair in `set`.
///
/// `on_progress(done, total)` is called after every `progress_interval` pairs
/// and after the last one. Returning [`ControlFlow::Break`] stops the
/// computation and yields `Ok(None)`.
pub fn compute_pairwise_matrix<F>(
    set: &EmbeddingSet,
    progress_interval: usize,
    mut on_progress: F,
) -> Result<Option<SimilarityMatrix>>
where
    F: FnMut(usize, usize) -> ControlFlow<()>,
{
    let size = set.len();
    let total = SimilarityMatrix::pair_count(size);
    let interval = progress_interval.max(1);
    let vectors = set.vectors();

    debug!("Comparing {total} pairs across {size} embeddings");

    let mut values = Vec::with_capacity(total);
    for i in 0..size {
        for j in (i + 1)..size {
            values.push(cosine_similarity(&vectors[i], &vectors[j])?);

            let done = values.len();
            if (done % interval == 0 || done == total) && on_progress(done, total).is_break() {
                debug!("Pairwise comparison stopped after {done}/{total} pairs");
                return Ok(None);
            }
        }
    }

    Ok(Some(SimilarityMatrix { size, values }))
}
