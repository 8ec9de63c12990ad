//! In-memory flat vector index with inner-product search.
//!
//! Vectors are addressed by insertion position. Position N always pairs with
//! the Nth article record of the same version.

/// Exact (brute-force) nearest-neighbor index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    /// Row-major storage: vector N occupies `data[N * dims..(N + 1) * dims]`
    data: Vec<f32>,
    dimensions: usize,
}

/// A nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Position of the vector inside the index
    pub position: usize,
    /// Raw inner product between query and stored vector
    pub score: f32,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            data: Vec::new(),
            dimensions,
        }
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(dimensions * capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.data.len() / self.dimensions
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append one vector; it receives position `len()`.
    pub fn add(&mut self, embedding: &[f32]) -> Result<usize, IndexError> {
        if embedding.len() != self.dimensions || self.dimensions == 0 {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        let position = self.len();
        self.data.extend_from_slice(embedding);
        Ok(position)
    }

    /// Append several vectors. Either all are added or none.
    pub fn add_all(&mut self, embeddings: &[Vec<f32>]) -> Result<(), IndexError> {
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: bad.len(),
            });
        }

        self.data.reserve(embeddings.len() * self.dimensions);
        for embedding in embeddings {
            self.data.extend_from_slice(embedding);
        }
        Ok(())
    }

    /// Get a stored vector by position.
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensions)?;
        self.data.get(start..start + self.dimensions)
    }

    /// Iterate over vectors in position order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimensions.max(1))
    }

    /// Build a new index holding only the given positions, in the given order.
    ///
    /// Position `i` of the result is `positions[i]` of `self`.
    pub fn subset(&self, positions: &[usize]) -> Result<Self, IndexError> {
        let mut subset = Self::with_capacity(self.dimensions, positions.len());
        for &position in positions {
            let vector = self.get(position).ok_or(IndexError::PositionOutOfRange {
                position,
                len: self.len(),
            })?;
            subset.data.extend_from_slice(vector);
        }
        Ok(subset)
    }

    /// Top-`k` positions by inner product, highest first.
    ///
    /// Exact ties keep insertion order (lower position first).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut results: Vec<SearchResult> = self
            .iter()
            .enumerate()
            .map(|(position, target)| SearchResult {
                position,
                score: Self::inner_product(query, target),
            })
            .collect();

        // stable sort keeps insertion order for equal scores
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        results.truncate(k.min(self.len()));

        Ok(results)
    }

    fn inner_product(query: &[f32], target: &[f32]) -> f32 {
        query.iter().zip(target.iter()).map(|(a, b)| a * b).sum()
    }

    /// Raw row-major vector data, used by storage.
    pub(crate) fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Rebuild from raw row-major data, used by storage.
    pub(crate) fn from_raw(dimensions: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if dimensions == 0 || data.len() % dimensions != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                got: data.len(),
            });
        }
        Ok(Self { data, dimensions })
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Position {position} out of range for index of {len} vectors")]
    PositionOutOfRange { position: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(dims: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn test_new_index() {
        let index = VectorIndex::new(1536);
        assert_eq!(index.dimensions(), 1536);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_add_and_get() {
        let mut index = VectorIndex::new(3);
        assert_eq!(index.add(&[1.0, 2.0, 3.0]).unwrap(), 0);
        assert_eq!(index.add(&[4.0, 5.0, 6.0]).unwrap(), 1);

        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(index.get(2), None);
    }

    #[test]
    fn test_add_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        let result = index.add(&[1.0, 0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
        assert!(index.is_empty());
    }

    #[test]
    fn test_add_all_is_all_or_nothing() {
        let mut index = VectorIndex::new(2);
        let result = index.add_all(&[vec![1.0, 0.0], vec![1.0]]);
        assert!(result.is_err());
        assert!(index.is_empty());

        index.add_all(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_search_inner_product_ranking() {
        let mut index = VectorIndex::new(3);
        index.add(&[1.0, 0.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0, 0.0]).unwrap();
        index.add(&[2.0, 0.0, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.1, 0.0], 10).unwrap();

        assert_eq!(results.len(), 3);
        // unnormalized: magnitude counts under inner product
        assert_eq!(results[0].position, 2);
        assert!((results[0].score - 2.0).abs() < 1e-6);
        assert_eq!(results[1].position, 0);
        assert_eq!(results[2].position, 1);
    }

    #[test]
    fn test_search_limit_capped_by_len() {
        let mut index = VectorIndex::new(3);
        for i in 0..3 {
            index.add(&one_hot(3, i)).unwrap();
        }

        assert_eq!(index.search(&one_hot(3, 0), 2).unwrap().len(), 2);
        assert_eq!(index.search(&one_hot(3, 0), 50).unwrap().len(), 3);
        assert!(index.search(&one_hot(3, 0), 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_ties_keep_insertion_order() {
        let mut index = VectorIndex::new(2);
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();

        let results = index.search(&[0.0, 1.0], 3).unwrap();
        let positions: Vec<usize> = results.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_search_with_nan_scores_does_not_panic() {
        let mut index = VectorIndex::new(2);
        index.add(&[f32::INFINITY, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[f32::NAN, 0.0]).unwrap();
        index.add(&[0.0, 2.0]).unwrap();

        // inf * 0 is NaN
        let results = index.search(&[0.0, 1.0], 4).unwrap();
        assert_eq!(results.len(), 4);
        let finite: Vec<usize> = results
            .iter()
            .filter(|r| r.score.is_finite())
            .map(|r| r.position)
            .collect();
        assert_eq!(finite, vec![3, 1]);
    }

    #[test]
    fn test_search_query_dimension_mismatch() {
        let index = VectorIndex::new(3);
        let result = index.search(&[1.0], 1);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_subset_preserves_requested_order() {
        let mut index = VectorIndex::new(4);
        for i in 0..4 {
            index.add(&one_hot(4, i)).unwrap();
        }

        let subset = index.subset(&[3, 1]).unwrap();
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.get(0), index.get(3));
        assert_eq!(subset.get(1), index.get(1));

        assert!(matches!(
            index.subset(&[7]),
            Err(IndexError::PositionOutOfRange { position: 7, len: 4 })
        ));
    }

    #[test]
    fn test_from_raw_rejects_ragged_data() {
        assert!(VectorIndex::from_raw(3, vec![0.0; 7]).is_err());
        assert_eq!(VectorIndex::from_raw(3, vec![0.0; 6]).unwrap().len(), 2);
    }
}
