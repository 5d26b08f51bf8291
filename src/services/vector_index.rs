//! Exact maximum-inner-product search over a fixed set of vectors.

use ndarray::{Array2, ArrayView1};

use crate::error::IndexError;

/// One ranked match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Offset into the vectors the index was built from.
    pub position: usize,
    pub score: f32,
}

/// Flat index: every search scores every stored vector.
///
/// Vectors are expected to be unit-normalized, in which case scores are
/// cosine similarities in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    matrix: Array2<f32>,
}

impl VectorIndex {
    /// Build from row vectors that all share one dimension.
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self, IndexError> {
        let dimension = vectors.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(vectors.len() * dimension);

        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(IndexError::NonFinite(position));
            }
            flat.extend_from_slice(vector);
        }

        let matrix = Array2::from_shape_vec((vectors.len(), dimension), flat)
            .map_err(|e| IndexError::Shape(e.to_string()))?;

        Ok(Self { matrix })
    }

    /// Number of indexed vectors.
    pub fn size(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }

    #[cfg(test)]
    pub fn vector(&self, position: usize) -> Option<ArrayView1<'_, f32>> {
        (position < self.size()).then(|| self.matrix.row(position))
    }

    /// Up to `k` hits by descending score; ties go to the lower position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension() {
            return Err(IndexError::QueryDimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }

        let scores = self.matrix.dot(&ArrayView1::from(query));

        let mut hits: Vec<SearchHit> = scores
            .iter()
            .enumerate()
            .map(|(position, &score)| SearchHit { position, score })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.position.cmp(&b.position))
        });
        hits.truncate(k);

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis(dim: usize) -> Vec<Vec<f32>> {
        (0..dim)
            .map(|i| {
                let mut v = vec![0.0; dim];
                v[i] = 1.0;
                v
            })
            .collect()
    }

    #[test]
    fn test_basis_vector_ranks_itself_first() {
        let vectors = basis(5);
        let index = VectorIndex::build(&vectors).unwrap();
        assert_eq!(index.size(), 5);
        assert_eq!(index.dimension(), 5);

        for (i, query) in vectors.iter().enumerate() {
            let hits = index.search(query, 5).unwrap();
            assert_eq!(hits[0].position, i);
            assert!((hits[0].score - 1.0).abs() < 1e-6);
            for hit in &hits[1..] {
                assert!(hit.score.abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_scores_descend() {
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let vectors = vec![vec![0.0, 1.0], vec![s, s], vec![1.0, 0.0], vec![-1.0, 0.0]];
        let index = VectorIndex::build(&vectors).unwrap();

        let hits = index.search(&[1.0, 0.0], 4).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![2, 1, 0, 3]);
        assert!((hits[3].score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_k_larger_than_size_returns_all() {
        let index = VectorIndex::build(&basis(3)).unwrap();
        let hits = index.search(&[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_k_limits_results() {
        let index = VectorIndex::build(&basis(4)).unwrap();
        assert_eq!(index.search(&[0.0, 0.0, 1.0, 0.0], 2).unwrap().len(), 2);
        assert!(index.search(&[0.0, 0.0, 1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = VectorIndex::build(&[]).unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[1.0, 2.0, 3.0], 4).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_on_build() {
        let result = VectorIndex::build(&[vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]);
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch {
                position: 1,
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let result = VectorIndex::build(&[vec![1.0, 0.0], vec![f32::NAN, 0.0]]);
        assert!(matches!(result, Err(IndexError::NonFinite(1))));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = VectorIndex::build(&basis(3)).unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(IndexError::QueryDimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_ties_break_by_position() {
        let vectors = vec![vec![1.0, 0.0]; 3];
        let index = VectorIndex::build(&vectors).unwrap();
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_vector_lookup() {
        let index = VectorIndex::build(&basis(2)).unwrap();
        assert_eq!(index.vector(1).unwrap().to_vec(), vec![0.0, 1.0]);
        assert!(index.vector(2).is_none());
    }
}
