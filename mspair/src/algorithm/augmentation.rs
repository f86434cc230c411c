use ndarray::{Array1, ArrayViewMut1};
use rand::Rng;
use rand::seq::index;

use crate::config::{GeneratorConfig, PeakRemovalConfig};
use crate::data::spectrum::BinnedSpectrum;
use crate::error::{GeneratorError, Result};

/// Randomly drops a share of the low intensity peaks.
///
/// Peaks with an intensity below `max_intensity` form the candidate set. A removal fraction is
/// drawn from `[0, max_removal)` and `ceil((1 - fraction) * n_candidates)` candidates are kept,
/// chosen without replacement. Peaks at or above `max_intensity` are always kept.
///
/// # Returns
///
/// A mask over the input peaks, `true` for retained peaks.
pub fn peak_removal_mask<R: Rng + ?Sized>(
    intensity: &[f64],
    removal: &PeakRemovalConfig,
    rng: &mut R,
) -> Vec<bool> {
    let mut mask: Vec<bool> = intensity.iter().map(|&i| i >= removal.max_intensity).collect();

    let candidates: Vec<usize> = (0..intensity.len()).filter(|&i| !mask[i]).collect();
    if candidates.is_empty() {
        return mask;
    }

    let removal_part = rng.gen::<f64>() * removal.max_removal;
    let keep = (((1.0 - removal_part) * candidates.len() as f64).ceil() as usize).min(candidates.len());

    for selected in index::sample(rng, candidates.len(), keep).into_iter() {
        mask[candidates[selected]] = true;
    }

    mask
}

/// Multiplies every intensity by `1 + augment_intensity * 2 * (U - 0.5)`, `U ~ U[0, 1)` per peak.
pub fn jitter_intensities<R: Rng + ?Sized>(intensity: &mut [f64], augment_intensity: f64, rng: &mut R) {
    for value in intensity.iter_mut() {
        *value *= 1.0 + augment_intensity * 2.0 * (rng.gen::<f64>() - 0.5);
    }
}

pub fn filter_with_mask<T: Copy>(vec: &[T], mask: &[bool]) -> Vec<T> {
    vec.iter()
        .zip(mask.iter())
        .filter(|&(_, &keep)| keep)
        .map(|(&v, _)| v)
        .collect()
}

/// Augments binned spectra and scatters them into dense, power-scaled vectors.
///
/// Augmentation is drawn fresh on every call, nothing is cached between draws.
#[derive(Clone, Debug)]
pub struct SpectrumEncoder {
    pub dim: usize,
    pub peak_scaling: f64,
    pub peak_removal: Option<PeakRemovalConfig>,
    pub augment_intensity: f64,
}

impl SpectrumEncoder {
    pub fn new(
        dim: usize,
        peak_scaling: f64,
        peak_removal: Option<PeakRemovalConfig>,
        augment_intensity: f64,
    ) -> Self {
        SpectrumEncoder { dim, peak_scaling, peak_removal, augment_intensity }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        SpectrumEncoder::new(
            config.dim,
            config.peak_scaling,
            config.augment_peak_removal,
            config.augment_intensity,
        )
    }

    /// Applies peak removal and intensity jitter.
    ///
    /// # Returns
    ///
    /// Tuple of (bins, intensities) of the retained peaks.
    pub fn augment<R: Rng + ?Sized>(&self, spectrum: &BinnedSpectrum, rng: &mut R) -> (Vec<u32>, Vec<f64>) {
        let (bins, mut intensity) = match &self.peak_removal {
            Some(removal) => {
                let mask = peak_removal_mask(&spectrum.intensity, removal, rng);
                (filter_with_mask(&spectrum.bins, &mask), filter_with_mask(&spectrum.intensity, &mask))
            }
            None => (spectrum.bins.to_vec(), spectrum.intensity.to_vec()),
        };

        if self.augment_intensity != 0.0 {
            jitter_intensities(&mut intensity, self.augment_intensity, rng);
        }

        (bins, intensity)
    }

    /// Augments `spectrum` and writes `intensity ^ peak_scaling` into `row` at the bin positions.
    ///
    /// `row` is expected to be zeroed, positions without a peak are left untouched.
    ///
    /// # Errors
    ///
    /// Fails with a data integrity error if `row` is not `dim` long or a bin lies outside `[0, dim)`.
    pub fn encode_into<R: Rng + ?Sized>(
        &self,
        spectrum: &BinnedSpectrum,
        mut row: ArrayViewMut1<'_, f32>,
        rng: &mut R,
    ) -> Result<()> {
        if row.len() != self.dim {
            return Err(GeneratorError::data_integrity(format!(
                "output row has length {}, expected {}",
                row.len(),
                self.dim
            )));
        }

        let (bins, intensity) = self.augment(spectrum, rng);
        for (&bin, &value) in bins.iter().zip(intensity.iter()) {
            let slot = row.get_mut(bin as usize).ok_or_else(|| {
                GeneratorError::data_integrity(format!("bin {} exceeds vector dimension {}", bin, self.dim))
            })?;
            *slot = value.powf(self.peak_scaling) as f32;
        }

        Ok(())
    }

    /// Augments and encodes `spectrum` into a fresh dense vector of length `dim`.
    pub fn encode<R: Rng + ?Sized>(&self, spectrum: &BinnedSpectrum, rng: &mut R) -> Result<Array1<f32>> {
        let mut dense = Array1::<f32>::zeros(self.dim);
        self.encode_into(spectrum, dense.view_mut(), rng)?;
        Ok(dense)
    }
}
