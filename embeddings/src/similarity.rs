//! Vector math over embeddings.
//!
//! Cosine similarity is reported in its natural `[-1, 1]` range. Callers that
//! compare against a `[0, 1]` threshold go through [`rescale_similarity`].

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

fn check_dimensions(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(EmbeddingError::ShapeMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// Compute the dot product between two embeddings.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Euclidean length of an embedding.
pub fn magnitude(a: &[f32]) -> f32 {
    a.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors, or either vector is all zeros
/// - -1.0 means opposite vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let dot = dot_product(a, b)?;
    let magnitude_a = magnitude(a);
    let magnitude_b = magnitude(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (magnitude_a * magnitude_b)).clamp(-1.0, 1.0))
}

/// Map a raw cosine similarity from `[-1, 1]` onto `[0, 1]`.
pub fn rescale_similarity(similarity: f32) -> f32 {
    ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Sum of absolute per-dimension differences.
pub fn l1_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum())
}

/// Compute the per-dimension mean of multiple embeddings.
pub fn average<E: AsRef<[f32]>>(embeddings: &[E]) -> Result<Embedding> {
    let Some(first) = embeddings.first() else {
        return Err(EmbeddingError::EmptyInput("cannot average zero embeddings".to_string()));
    };

    let dim = first.as_ref().len();
    let mut result = vec![0.0f32; dim];

    for embedding in embeddings {
        let embedding = embedding.as_ref();
        check_dimensions(&result, embedding)?;
        for (acc, val) in result.iter_mut().zip(embedding) {
            *acc += val;
        }
    }

    let n = embeddings.len() as f32;
    for val in &mut result {
        *val /= n;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![0.3, -1.2, 4.0];
        let sim = cosine_similarity(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim - (-1.0)).abs() < 1e-6);
        assert_eq!(rescale_similarity(sim), 0.0);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let zero = vec![0.0, 0.0];
        let b = vec![0.5, 0.5];
        assert_eq!(cosine_similarity(&zero, &b).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&b, &zero).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_similarity_bounded() {
        let vectors = [
            vec![1.0, 2.0, 3.0],
            vec![-3.0, 0.5, 2.0],
            vec![1e-3, -7.0, 0.0],
            vec![100.0, 100.0, -100.0],
        ];
        for a in &vectors {
            for b in &vectors {
                let sim = cosine_similarity(a, b).unwrap();
                assert!((-1.0..=1.0).contains(&sim));
                assert!((0.0..=1.0).contains(&rescale_similarity(sim)));
            }
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(matches!(
            cosine_similarity(&a, &b),
            Err(EmbeddingError::ShapeMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert!(dot_product(&a, &b).is_err());
        assert!(l1_distance(&a, &b).is_err());
    }

    #[test]
    fn test_l1_distance() {
        let a = vec![1.0, -2.0, 0.5];
        let b = vec![0.0, 1.0, 0.5];
        assert_eq!(l1_distance(&a, &b).unwrap(), 4.0);
        assert_eq!(l1_distance(&b, &a).unwrap(), 4.0);
        assert_eq!(l1_distance(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn test_magnitude() {
        assert_eq!(magnitude(&[3.0, 4.0]), 5.0);
        assert_eq!(magnitude(&[]), 0.0);
    }

    #[test]
    fn test_average() {
        let vectors = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert_eq!(average(&vectors).unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_average_errors() {
        let empty: Vec<Embedding> = Vec::new();
        assert!(matches!(
            average(&empty),
            Err(EmbeddingError::EmptyInput(_))
        ));

        let ragged = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            average(&ragged),
            Err(EmbeddingError::ShapeMismatch { .. })
        ));
    }
}
