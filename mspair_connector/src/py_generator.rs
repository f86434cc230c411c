use std::collections::BTreeMap;
use nalgebra::DMatrix;
use numpy::{IntoPyArray, PyArray1, PyArray3, PyReadonlyArray2};
use pyo3::exceptions::{PyIndexError, PyValueError};
use pyo3::prelude::*;

use mspair::data::identity::IdentityToSpectra;
use mspair::data::spectrum::BinnedSpectrum;
use mspair::{
    DataGenerator, DataGeneratorBuilder, FallbackStrategy, GeneratorConfig, GeneratorError, PairBatch,
    PeakRemovalConfig, SimilarityBand,
};

type PyBatch<'py> = (
    (Bound<'py, PyArray3<f32>>, Bound<'py, PyArray3<f32>>),
    Bound<'py, PyArray1<f32>>,
);

fn to_py_err(error: GeneratorError) -> PyErr {
    match error {
        GeneratorError::IndexOutOfRange { .. } => PyIndexError::new_err(error.to_string()),
        _ => PyValueError::new_err(error.to_string()),
    }
}

fn default_peak_removal() -> Option<BTreeMap<String, f64>> {
    Some(PeakRemovalConfig::default().to_map())
}

fn batch_to_py(py: Python<'_>, batch: PairBatch) -> PyBatch<'_> {
    (
        (batch.reference.into_pyarray_bound(py), batch.query.into_pyarray_bound(py)),
        batch.labels.into_pyarray_bound(py),
    )
}

/// Keras style batch generator over spectrum pairs, `len()` batches per epoch.
#[pyclass]
pub struct PyPairDataGenerator {
    inner: DataGenerator,
}

#[pymethods]
impl PyPairDataGenerator {
    /// `augment_peak_removal` is a dict with the keys `max_removal` and `max_intensity`, or `None`
    /// to keep every peak. `fallback` is `"positional_shift"` or `"excluded_arg_max"`.
    #[new]
    #[pyo3(signature = (
        spectrums_binned_dicts,
        list_ids,
        score_array,
        identity_keys,
        spectrum_keys,
        batch_size = 32,
        num_turns = 1,
        peak_scaling = 0.5,
        dim = 10000,
        shuffle = true,
        ignore_equal_pairs = true,
        same_prob_bins = None,
        augment_peak_removal = default_peak_removal(),
        augment_intensity = 0.1,
        fallback = "positional_shift",
        seed = None,
    ))]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spectrums_binned_dicts: Vec<BTreeMap<u32, f64>>,
        list_ids: Vec<usize>,
        score_array: PyReadonlyArray2<'_, f64>,
        identity_keys: Vec<String>,
        spectrum_keys: Vec<String>,
        batch_size: usize,
        num_turns: usize,
        peak_scaling: f64,
        dim: usize,
        shuffle: bool,
        ignore_equal_pairs: bool,
        same_prob_bins: Option<Vec<(f64, f64)>>,
        augment_peak_removal: Option<BTreeMap<String, f64>>,
        augment_intensity: f64,
        fallback: &str,
        seed: Option<u64>,
    ) -> PyResult<Self> {
        let fallback = match fallback {
            "positional_shift" => FallbackStrategy::PositionalShift,
            "excluded_arg_max" => FallbackStrategy::ExcludedArgMax,
            other => return Err(PyValueError::new_err(format!("unknown fallback strategy: {}", other))),
        };

        let augment_peak_removal = augment_peak_removal
            .as_ref()
            .map(PeakRemovalConfig::from_map)
            .transpose()
            .map_err(to_py_err)?;

        let defaults = GeneratorConfig::default();
        let config = GeneratorConfig {
            batch_size,
            num_turns,
            peak_scaling,
            dim,
            shuffle,
            ignore_equal_pairs,
            same_prob_bins: same_prob_bins
                .map(|bins| bins.into_iter().map(SimilarityBand::from).collect())
                .unwrap_or(defaults.same_prob_bins),
            augment_peak_removal,
            augment_intensity,
            fallback,
        };

        let spectra = spectrums_binned_dicts
            .iter()
            .map(BinnedSpectrum::from_map)
            .collect::<Result<Vec<_>, _>>()
            .map_err(to_py_err)?;

        let view = score_array.as_array();
        let scores = DMatrix::from_fn(view.nrows(), view.ncols(), |i, j| view[[i, j]]);

        let identities = IdentityToSpectra::from_keys(&identity_keys, &spectrum_keys).map_err(to_py_err)?;

        let builder = DataGeneratorBuilder::new()
            .spectra(spectra)
            .sample_ids(list_ids)
            .scores(&scores)
            .identities(identities)
            .config(config);

        let inner = match seed {
            Some(seed) => builder.build_seeded(seed),
            None => builder.build_from_entropy(),
        }
        .map_err(to_py_err)?;

        Ok(PyPairDataGenerator { inner })
    }

    fn __len__(&self) -> usize {
        self.inner.batch_count()
    }

    fn __getitem__<'py>(&mut self, py: Python<'py>, index: usize) -> PyResult<PyBatch<'py>> {
        let inner = &mut self.inner;
        let batch = py.allow_threads(|| inner.get_batch(index)).map_err(to_py_err)?;
        Ok(batch_to_py(py, batch))
    }

    /// Computes several batches in parallel, batch `i` is drawn with seed `seed + i`.
    pub fn get_batches<'py>(&self, py: Python<'py>, indices: Vec<usize>, seed: u64) -> PyResult<Vec<PyBatch<'py>>> {
        let inner = &self.inner;
        let batches = py.allow_threads(|| inner.get_batches_par(&indices, seed)).map_err(to_py_err)?;
        Ok(batches.into_iter().map(|batch| batch_to_py(py, batch)).collect())
    }

    pub fn on_epoch_end(&mut self) {
        self.inner.on_epoch_end();
    }

    #[getter]
    pub fn batch_size(&self) -> usize {
        self.inner.config().batch_size
    }

    #[getter]
    pub fn indexes(&self) -> Vec<usize> {
        self.inner.indexes().to_vec()
    }
}
