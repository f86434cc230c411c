use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::data::identity::IdentityToSpectra;
use crate::data::spectrum::BinnedSpectrum;
use crate::error::{GeneratorError, Result};

/// Already binned training data as exchanged in JSON files.
///
/// `scores` holds one row per identity, `null` marks an unknown similarity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingDataset {
    /// Binned spectra as `{bin: intensity}` maps
    pub spectra: Vec<BTreeMap<u32, f64>>,
    /// Identity indices used for training
    pub sample_ids: Vec<usize>,
    /// Reference similarities between identities
    pub scores: Vec<Vec<Option<f64>>>,
    /// Key of every identity (e.g. InChIKey), by identity index
    pub identity_keys: Vec<String>,
    /// Key of every spectrum, by spectrum position
    pub spectrum_keys: Vec<String>,
}

impl TrainingDataset {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn binned_spectra(&self) -> Result<Vec<BinnedSpectrum>> {
        self.spectra.iter().map(BinnedSpectrum::from_map).collect()
    }

    /// Score matrix with unknown entries set to NaN.
    pub fn score_matrix(&self) -> Result<DMatrix<f64>> {
        let n = self.scores.len();
        if self.scores.iter().any(|row| row.len() != n) {
            return Err(GeneratorError::configuration("score rows must form a square matrix"));
        }
        Ok(DMatrix::from_fn(n, n, |i, j| self.scores[i][j].unwrap_or(f64::NAN)))
    }

    pub fn identities(&self) -> Result<IdentityToSpectra> {
        if self.spectrum_keys.len() != self.spectra.len() {
            return Err(GeneratorError::data_integrity(format!(
                "{} spectrum keys given for {} spectra",
                self.spectrum_keys.len(),
                self.spectra.len()
            )));
        }
        IdentityToSpectra::from_keys(&self.identity_keys, &self.spectrum_keys)
    }
}
