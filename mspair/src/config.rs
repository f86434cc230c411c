use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{GeneratorError, Result};

/// A target similarity interval `(low, high]` used to pick the relationship of a training pair.
///
/// Serialized as a plain `[low, high]` pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct SimilarityBand {
    pub low: f64,
    pub high: f64,
}

impl SimilarityBand {
    pub fn new(low: f64, high: f64) -> Self {
        SimilarityBand { low, high }
    }

    /// True if `score` lies in `(low - widen, high + widen]`.
    #[inline]
    pub fn contains(&self, score: f64, widen: f64) -> bool {
        score > self.low - widen && score <= self.high + widen
    }
}

impl From<(f64, f64)> for SimilarityBand {
    fn from((low, high): (f64, f64)) -> Self {
        SimilarityBand { low, high }
    }
}

impl From<SimilarityBand> for (f64, f64) {
    fn from(band: SimilarityBand) -> Self {
        (band.low, band.high)
    }
}

/// Random removal of low intensity peaks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakRemovalConfig {
    /// Upper bound of the removed fraction of low intensity peaks (default: 0.2)
    pub max_removal: f64,
    /// Peaks with an intensity below this value are candidates for removal (default: 0.2)
    pub max_intensity: f64,
}

impl Default for PeakRemovalConfig {
    fn default() -> Self {
        PeakRemovalConfig {
            max_removal: 0.2,
            max_intensity: 0.2,
        }
    }
}

/// How the pair sampler picks a partner once no band, however widened, yields a candidate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Arg-max over the sample ids with the anchor removed. The resulting index is shifted past the
    /// anchor's position in the sample id list before mapping it back, so any ordering works as long
    /// as the anchor occurs once. If a repeated anchor id is hit, the direct arg-max is used.
    #[default]
    PositionalShift,
    /// Arg-max computed directly over all sample ids that differ from the anchor.
    ExcludedArgMax,
}

impl PeakRemovalConfig {
    /// Reads the settings from a `{"max_removal": .., "max_intensity": ..}` map, both keys are required.
    pub fn from_map(map: &BTreeMap<String, f64>) -> Result<Self> {
        let field = |key: &str| {
            map.get(key)
                .copied()
                .ok_or_else(|| GeneratorError::configuration(format!("peak removal setting '{}' is missing", key)))
        };
        Ok(PeakRemovalConfig { max_removal: field("max_removal")?, max_intensity: field("max_intensity")? })
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("max_removal".to_string(), self.max_removal),
            ("max_intensity".to_string(), self.max_intensity),
        ])
    }
}

fn default_peak_removal() -> Option<PeakRemovalConfig> {
    Some(PeakRemovalConfig::default())
}

/// Configuration for the pair batch generator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Number of pairs per batch (default: 32)
    pub batch_size: usize,
    /// Number of passes over all sample ids per epoch (default: 1)
    pub num_turns: usize,
    /// Exponent applied to every peak intensity (default: 0.5)
    pub peak_scaling: f64,
    /// Length of the dense output vector (default: 10000)
    pub dim: usize,
    /// Shuffle the epoch index sequence (default: true)
    pub shuffle: bool,
    /// Exclude the anchor itself from the partner candidates (default: true)
    pub ignore_equal_pairs: bool,
    /// Similarity bands a partner is drawn from (default: [(0, 0.5), (0.5, 1)])
    pub same_prob_bins: Vec<SimilarityBand>,
    /// Low intensity peak removal, `None` disables it (default: {max_removal: 0.2, max_intensity: 0.2})
    #[serde(default = "default_peak_removal")]
    pub augment_peak_removal: Option<PeakRemovalConfig>,
    /// Relative intensity jitter, 0 disables it (default: 0.1)
    pub augment_intensity: f64,
    /// Partner selection when band matching fails (default: positional shift)
    pub fallback: FallbackStrategy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            batch_size: 32,
            num_turns: 1,
            peak_scaling: 0.5,
            dim: 10000,
            shuffle: true,
            ignore_equal_pairs: true,
            same_prob_bins: vec![SimilarityBand::new(0.0, 0.5), SimilarityBand::new(0.5, 1.0)],
            augment_peak_removal: default_peak_removal(),
            augment_intensity: 0.1,
            fallback: FallbackStrategy::PositionalShift,
        }
    }
}

impl GeneratorConfig {
    /// Reads a configuration from a JSON file, missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: GeneratorConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks all settings, see `GeneratorError::Configuration` for the failure cases.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(GeneratorError::configuration("batch_size must be positive"));
        }
        if self.num_turns == 0 {
            return Err(GeneratorError::configuration("num_turns must be positive"));
        }
        if self.dim == 0 {
            return Err(GeneratorError::configuration("dim must be positive"));
        }
        if !self.peak_scaling.is_finite() || self.peak_scaling < 0.0 {
            return Err(GeneratorError::configuration("peak_scaling must be finite and non-negative"));
        }
        // factors 1 + a * 2 * (U - 0.5) stay non-negative only for a <= 1
        if !(0.0..=1.0).contains(&self.augment_intensity) {
            return Err(GeneratorError::configuration("augment_intensity must lie in [0, 1]"));
        }

        if self.same_prob_bins.is_empty() {
            return Err(GeneratorError::configuration("same_prob_bins must hold at least one band"));
        }
        for band in &self.same_prob_bins {
            if band.low.is_nan() || band.high.is_nan() || band.low > band.high {
                return Err(GeneratorError::configuration(format!(
                    "malformed similarity band ({}, {})",
                    band.low, band.high
                )));
            }
        }

        if let Some(removal) = &self.augment_peak_removal {
            if !(0.0..=1.0).contains(&removal.max_removal) {
                return Err(GeneratorError::configuration("max_removal must lie in [0, 1]"));
            }
            if removal.max_intensity.is_nan() {
                return Err(GeneratorError::configuration("max_intensity must not be NaN"));
            }
        }

        Ok(())
    }

    /// Number of batches per epoch for `num_samples` sample ids.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mspair::config::GeneratorConfig;
    /// let config = GeneratorConfig { batch_size: 32, num_turns: 2, ..Default::default() };
    /// assert_eq!(config.batch_count(100).unwrap(), 6);
    /// ```
    pub fn batch_count(&self, num_samples: usize) -> Result<usize> {
        if self.batch_size == 0 {
            return Err(GeneratorError::configuration("batch_size must be positive"));
        }
        Ok((num_samples / self.batch_size) * self.num_turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_removal_from_map() {
        let map = BTreeMap::from([("max_removal".to_string(), 0.3), ("max_intensity".to_string(), 0.1)]);
        let removal = PeakRemovalConfig::from_map(&map).unwrap();
        assert_eq!(removal, PeakRemovalConfig { max_removal: 0.3, max_intensity: 0.1 });
        assert_eq!(PeakRemovalConfig::from_map(&PeakRemovalConfig::default().to_map()).unwrap(), PeakRemovalConfig::default());

        let partial = BTreeMap::from([("max_removal".to_string(), 0.3)]);
        assert!(matches!(PeakRemovalConfig::from_map(&partial), Err(GeneratorError::Configuration(_))));
    }

    #[test]
    fn test_default_config() {
        let config = GeneratorConfig::default();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.num_turns, 1);
        assert_eq!(config.dim, 10000);
        assert!(config.shuffle);
        assert!(config.ignore_equal_pairs);
        assert_eq!(config.same_prob_bins.len(), 2);
        assert_eq!(config.augment_peak_removal, Some(PeakRemovalConfig { max_removal: 0.2, max_intensity: 0.2 }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = GeneratorConfig { batch_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(GeneratorError::Configuration(_))));
        assert!(matches!(config.batch_count(100), Err(GeneratorError::Configuration(_))));
    }

    #[test]
    fn test_malformed_bands_rejected() {
        let empty = GeneratorConfig { same_prob_bins: vec![], ..Default::default() };
        assert!(empty.validate().is_err());

        let inverted = GeneratorConfig { same_prob_bins: vec![SimilarityBand::new(0.8, 0.2)], ..Default::default() };
        assert!(inverted.validate().is_err());

        let nan = GeneratorConfig { same_prob_bins: vec![SimilarityBand::new(f64::NAN, 0.2)], ..Default::default() };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_batch_count() {
        let config = GeneratorConfig { batch_size: 32, num_turns: 2, ..Default::default() };
        assert_eq!(config.batch_count(100).unwrap(), 6);
        assert_eq!(config.batch_count(31).unwrap(), 0);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let json = r#"{
            "batch_size": 8,
            "same_prob_bins": [[0.0, 0.3], [0.3, 0.7], [0.7, 1.0]],
            "augment_peak_removal": null,
            "fallback": "excluded_arg_max"
        }"#;
        let config: GeneratorConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.batch_size, 8);
        assert_eq!(config.dim, 10000);
        assert!((config.peak_scaling - 0.5).abs() < 1e-12);
        assert_eq!(config.same_prob_bins[1], SimilarityBand::new(0.3, 0.7));
        assert_eq!(config.augment_peak_removal, None);
        assert_eq!(config.fallback, FallbackStrategy::ExcludedArgMax);
    }

    #[test]
    fn test_missing_peak_removal_keeps_default() {
        let config: GeneratorConfig = serde_json::from_str(r#"{"dim": 100}"#).unwrap();
        assert_eq!(config.augment_peak_removal, Some(PeakRemovalConfig::default()));
    }

    #[test]
    fn test_out_of_range_augmentation_rejected() {
        let jitter = GeneratorConfig { augment_intensity: 1.5, ..Default::default() };
        assert!(jitter.validate().is_err());

        let removal = GeneratorConfig {
            augment_peak_removal: Some(PeakRemovalConfig { max_removal: 1.2, max_intensity: 0.2 }),
            ..Default::default()
        };
        assert!(removal.validate().is_err());

        let scaling = GeneratorConfig { peak_scaling: -0.5, ..Default::default() };
        assert!(scaling.validate().is_err());
    }

    #[test]
    fn test_band_contains() {
        let band = SimilarityBand::new(0.5, 1.0);
        assert!(!band.contains(0.5, 0.0));
        assert!(band.contains(0.5, 0.1));
        assert!(band.contains(1.0, 0.0));
        assert!(band.contains(0.7, 0.0));
    }
}
