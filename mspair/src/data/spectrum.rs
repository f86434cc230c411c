use std::collections::BTreeMap;
use std::sync::Arc;
use serde::{Serialize, Deserialize};

use crate::error::{GeneratorError, Result};

/// Represents a binned spectrum as a sparse mapping from bin index to intensity.
///
/// Bins are the discretized peak positions produced by an upstream binning step,
/// intensities are non-negative. Several binned spectra can belong to the same
/// molecular identity (e.g. replicate measurements).
///
/// Uses Arc<Vec<T>> for efficient cloning - clone is O(1) instead of O(n).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BinnedSpectrum {
    pub bins: Arc<Vec<u32>>,
    pub intensity: Arc<Vec<f64>>,
}

impl BinnedSpectrum {
    /// Constructs a new `BinnedSpectrum`.
    ///
    /// # Arguments
    ///
    /// * `bins` - A vector of bin indices (peak positions).
    /// * `intensity` - A vector of intensity values corresponding to the bins.
    ///
    /// # Errors
    ///
    /// Fails with a data integrity error if the lengths differ or an intensity is negative or not finite.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mspair::data::spectrum::BinnedSpectrum;
    /// let spectrum = BinnedSpectrum::new(vec![2, 5], vec![0.04, 0.9]).unwrap();
    /// assert_eq!(spectrum.len(), 2);
    /// assert_eq!(*spectrum.bins, vec![2, 5]);
    /// ```
    pub fn new(bins: Vec<u32>, intensity: Vec<f64>) -> Result<Self> {
        if bins.len() != intensity.len() {
            return Err(GeneratorError::data_integrity(format!(
                "spectrum has {} bins but {} intensities",
                bins.len(),
                intensity.len()
            )));
        }

        if let Some(bad) = intensity.iter().find(|&&i| !i.is_finite() || i < 0.0) {
            return Err(GeneratorError::data_integrity(format!(
                "spectrum intensities must be finite and non-negative, found {}",
                bad
            )));
        }

        Ok(BinnedSpectrum {
            bins: Arc::new(bins),
            intensity: Arc::new(intensity),
        })
    }

    /// Builds a spectrum from a `{bin: intensity}` map, bins end up in ascending order.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use std::collections::BTreeMap;
    /// # use mspair::data::spectrum::BinnedSpectrum;
    /// let peaks: BTreeMap<u32, f64> = [(5, 0.9), (2, 0.04)].into_iter().collect();
    /// let spectrum = BinnedSpectrum::from_map(&peaks).unwrap();
    /// assert_eq!(*spectrum.bins, vec![2, 5]);
    /// ```
    pub fn from_map(peaks: &BTreeMap<u32, f64>) -> Result<Self> {
        let (bins, intensity): (Vec<u32>, Vec<f64>) = peaks.iter().map(|(&b, &i)| (b, i)).unzip();
        BinnedSpectrum::new(bins, intensity)
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Largest bin index, `None` for an empty spectrum.
    pub fn max_bin(&self) -> Option<u32> {
        self.bins.iter().copied().max()
    }

    pub fn peaks(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.bins.iter().copied().zip(self.intensity.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_length_mismatch() {
        let result = BinnedSpectrum::new(vec![1, 2, 3], vec![0.1, 0.2]);
        assert!(matches!(result, Err(GeneratorError::DataIntegrity(_))));
    }

    #[test]
    fn test_new_rejects_negative_intensity() {
        let result = BinnedSpectrum::new(vec![1, 2], vec![0.1, -0.2]);
        assert!(matches!(result, Err(GeneratorError::DataIntegrity(_))));
    }

    #[test]
    fn test_from_map_sorted_bins() {
        let peaks: BTreeMap<u32, f64> = [(10, 0.5), (3, 1.0), (7, 0.25)].into_iter().collect();
        let spectrum = BinnedSpectrum::from_map(&peaks).unwrap();

        assert_eq!(*spectrum.bins, vec![3, 7, 10]);
        assert_eq!(*spectrum.intensity, vec![1.0, 0.25, 0.5]);
        assert_eq!(spectrum.max_bin(), Some(10));
    }

    #[test]
    fn test_empty_spectrum() {
        let spectrum = BinnedSpectrum::new(vec![], vec![]).unwrap();
        assert!(spectrum.is_empty());
        assert_eq!(spectrum.max_bin(), None);
    }
}
