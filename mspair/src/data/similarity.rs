use nalgebra::DMatrix;

use crate::error::{GeneratorError, Result};

/// Reference similarity scores between molecular identities.
///
/// Holds a private `M x M` copy of the caller's scores with every unknown (NaN) entry
/// replaced by `0.0`. The replacement happens once, at construction.
#[derive(Clone, Debug)]
pub struct SimilarityMatrix {
    scores: DMatrix<f64>,
}

impl SimilarityMatrix {
    /// Copies `scores` and canonicalizes NaN entries to `0.0`.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error if the matrix is not square or empty.
    pub fn new(scores: &DMatrix<f64>) -> Result<Self> {
        if scores.nrows() != scores.ncols() {
            return Err(GeneratorError::configuration(format!(
                "similarity matrix must be square, got {}x{}",
                scores.nrows(),
                scores.ncols()
            )));
        }
        if scores.nrows() == 0 {
            return Err(GeneratorError::configuration("similarity matrix is empty"));
        }

        let scores = scores.map(|s| if s.is_nan() { 0.0 } else { s });
        Ok(SimilarityMatrix { scores })
    }

    /// Number of identities `M`.
    pub fn num_identities(&self) -> usize {
        self.scores.nrows()
    }

    #[inline]
    pub fn score(&self, id1: usize, id2: usize) -> f64 {
        self.scores[(id1, id2)]
    }

    pub fn contains(&self, id: usize) -> bool {
        id < self.num_identities()
    }
}
