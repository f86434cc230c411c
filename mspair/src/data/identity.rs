use std::hash::Hash;
use rand::Rng;
use rand::seq::SliceRandom;
use rustc_hash::FxHashMap;

use crate::error::{GeneratorError, Result};

/// Maps every identity index (row/column of the similarity matrix) to the positions
/// of all binned spectra that share that identity.
#[derive(Clone, Debug)]
pub struct IdentityToSpectra {
    spectra: Vec<Vec<usize>>,
}

impl IdentityToSpectra {
    /// Builds the mapping from an identity index per spectrum.
    ///
    /// # Arguments
    ///
    /// * `spectrum_identities` - identity index of every spectrum, by spectrum position.
    /// * `num_identities` - number of identities `M` known to the similarity matrix.
    pub fn from_identity_indices(spectrum_identities: &[usize], num_identities: usize) -> Result<Self> {
        let mut spectra = vec![Vec::new(); num_identities];

        for (position, &identity) in spectrum_identities.iter().enumerate() {
            match spectra.get_mut(identity) {
                Some(slot) => slot.push(position),
                None => return Err(GeneratorError::data_integrity(format!(
                    "spectrum {} references identity {} but only {} identities are known",
                    position, identity, num_identities
                ))),
            }
        }

        Ok(IdentityToSpectra { spectra })
    }

    /// Builds the mapping from identity keys, e.g. InChIKeys.
    ///
    /// # Arguments
    ///
    /// * `identity_keys` - key of every identity index, by identity index.
    /// * `spectrum_keys` - key of every spectrum, by spectrum position.
    ///
    /// Spectra whose key is not listed in `identity_keys` are not reachable through any identity.
    pub fn from_keys<K: Hash + Eq>(identity_keys: &[K], spectrum_keys: &[K]) -> Result<Self> {
        let mut key_to_identity: FxHashMap<&K, usize> = FxHashMap::default();
        for (identity, key) in identity_keys.iter().enumerate() {
            if key_to_identity.insert(key, identity).is_some() {
                return Err(GeneratorError::data_integrity(format!(
                    "identity key of identity {} is listed more than once",
                    identity
                )));
            }
        }

        let mut spectra = vec![Vec::new(); identity_keys.len()];
        for (position, key) in spectrum_keys.iter().enumerate() {
            if let Some(&identity) = key_to_identity.get(key) {
                spectra[identity].push(position);
            }
        }

        Ok(IdentityToSpectra { spectra })
    }

    pub fn num_identities(&self) -> usize {
        self.spectra.len()
    }

    /// Positions of all spectra sharing `identity`, empty for unknown identities.
    pub fn spectra_of(&self, identity: usize) -> &[usize] {
        self.spectra.get(identity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Picks one spectrum of `identity` uniformly at random.
    ///
    /// # Errors
    ///
    /// Fails with a data integrity error if the identity has no associated spectrum.
    pub fn resolve<R: Rng + ?Sized>(&self, identity: usize, rng: &mut R) -> Result<usize> {
        self.spectra_of(identity).choose(rng).copied().ok_or_else(|| {
            GeneratorError::data_integrity(format!("identity {} has no associated spectra", identity))
        })
    }
}
