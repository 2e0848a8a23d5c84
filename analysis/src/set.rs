//! Embeddings gathered for one run.

use charsim_embeddings::{Embedding, EmbeddingError, Result};

/// Insertion-ordered embeddings keyed by record id, all of one dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingSet {
    ids: Vec<String>,
    vectors: Vec<Embedding>,
}

impl EmbeddingSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `(id, embedding)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Embedding)>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for (id, embedding) in pairs {
            set.insert(id, embedding)?;
        }
        Ok(set)
    }

    /// Add an embedding, replacing any previous one for the same id.
    pub fn insert(&mut self, id: impl Into<String>, embedding: Embedding) -> Result<()> {
        let id = id.into();

        if embedding.is_empty() {
            return Err(EmbeddingError::EmptyInput(format!(
                "embedding for {id} has no dimensions"
            )));
        }

        if let Some(dimension) = self.dimension() {
            if embedding.len() != dimension {
                return Err(EmbeddingError::ShapeMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
        }

        match self.position(&id) {
            Some(index) => self.vectors[index] = embedding,
            None => {
                self.ids.push(id);
                self.vectors.push(embedding);
            }
        }

        Ok(())
    }

    /// Dimension shared by every embedding, if any are stored.
    pub fn dimension(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }

    /// Number of stored embeddings.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no embeddings are stored.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Index of `id` in insertion order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|existing| existing == id)
    }

    /// Embedding stored for `id`.
    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.position(id).map(|index| self.vectors[index].as_slice())
    }

    /// Id at `index` in insertion order.
    pub fn id(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    /// All ids in insertion order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// All embeddings, parallel to [`EmbeddingSet::ids`].
    pub fn vectors(&self) -> &[Embedding] {
        &self.vectors
    }

    /// Iterate over `(id, embedding)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.ids
            .iter()
            .map(String::as_str)
            .zip(self.vectors.iter().map(Vec::as_slice))
    }
}
