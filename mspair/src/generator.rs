use std::sync::Arc;
use log::{debug, info, warn};
use nalgebra::DMatrix;
use ndarray::{s, Array1, Array3};
use rand::{Rng, SeedableRng};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::algorithm::augmentation::SpectrumEncoder;
use crate::algorithm::pair_sampler::PairSampler;
use crate::config::GeneratorConfig;
use crate::data::identity::IdentityToSpectra;
use crate::data::similarity::SimilarityMatrix;
use crate::data::spectrum::BinnedSpectrum;
use crate::error::{GeneratorError, Result};

/// One batch of training pairs.
///
/// `reference` and `query` are shaped `(batch_size, 1, dim)`, `labels` holds `batch_size` scores.
#[derive(Clone, Debug)]
pub struct PairBatch {
    pub reference: Array3<f32>,
    pub query: Array3<f32>,
    pub labels: Array1<f32>,
    /// Identity pairs `(anchor, partner)` the rows were drawn from.
    pub pairs: Vec<(usize, usize)>,
}

impl PairBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A sized, randomly indexable source of training batches.
///
/// `on_epoch_end` has to be called by the consumer after every full pass over `batch_count` batches.
pub trait BatchSource {
    type Batch;

    fn batch_count(&self) -> usize;
    fn get_batch(&mut self, index: usize) -> Result<Self::Batch>;
    fn on_epoch_end(&mut self);
}

/// Immutable inputs and components shared by every batch of a generator.
#[derive(Clone, Debug)]
struct PairBatchAssembler {
    spectra: Arc<Vec<BinnedSpectrum>>,
    sample_ids: Vec<usize>,
    scores: SimilarityMatrix,
    identities: IdentityToSpectra,
    sampler: PairSampler,
    encoder: SpectrumEncoder,
    batch_size: usize,
    dim: usize,
}

impl PairBatchAssembler {
    fn assemble<R: Rng + ?Sized>(&self, positions: &[usize], rng: &mut R) -> Result<PairBatch> {
        let pairs: Vec<(usize, usize)> = positions
            .iter()
            .map(|&position| self.sampler.sample_pair(position, &self.sample_ids, &self.scores, rng))
            .collect();

        let mut reference = Array3::<f32>::zeros((self.batch_size, 1, self.dim));
        let mut query = Array3::<f32>::zeros((self.batch_size, 1, self.dim));
        let mut labels = Array1::<f32>::zeros(self.batch_size);

        for (i, &(id1, id2)) in pairs.iter().enumerate() {
            let spectrum_1 = self.identities.resolve(id1, rng)?;
            let spectrum_2 = self.identities.resolve(id2, rng)?;

            self.encoder.encode_into(&self.spectra[spectrum_1], reference.slice_mut(s![i, 0, ..]), rng)?;
            self.encoder.encode_into(&self.spectra[spectrum_2], query.slice_mut(s![i, 0, ..]), rng)?;

            labels[i] = self.label(id1, id2, rng);
        }

        Ok(PairBatch { reference, query, labels, pairs })
    }

    fn label<R: Rng + ?Sized>(&self, id1: usize, id2: usize, rng: &mut R) -> f32 {
        let score = self.scores.score(id1, id2);
        if score.is_nan() {
            warn!("similarity of identities {} and {} is unknown, drawing a random label", id1, id2);
            return rng.gen::<f64>() as f32;
        }
        score as f32
    }
}

/// Generates batches of spectrum pairs with similarity labels.
///
/// Per epoch, every position of the sample id list is visited `num_turns` times as anchor. For
/// each anchor a partner identity is sampled within a random similarity band, both identities are
/// resolved to one of their spectra, and the spectra are augmented and encoded into dense rows.
pub struct DataGenerator<R: Rng = ChaCha8Rng> {
    assembler: PairBatchAssembler,
    config: GeneratorConfig,
    indexes: Vec<usize>,
    rng: R,
}

impl<R: Rng> DataGenerator<R> {
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn sample_ids(&self) -> &[usize] {
        &self.assembler.sample_ids
    }

    /// Current epoch index sequence, positions into the sample id list.
    pub fn indexes(&self) -> &[usize] {
        &self.indexes
    }

    /// Number of batches per epoch: `floor(len(sample_ids) / batch_size) * num_turns`.
    pub fn batch_count(&self) -> usize {
        (self.assembler.sample_ids.len() / self.config.batch_size) * self.config.num_turns
    }

    /// Assembles batch `index` of the current epoch, drawing randomness from the generator's own source.
    pub fn get_batch(&mut self, index: usize) -> Result<PairBatch> {
        let positions = batch_positions(&self.indexes, self.config.batch_size, self.batch_count(), index)?;
        self.assembler.assemble(positions, &mut self.rng)
    }

    /// Assembles batch `index` of the current epoch, drawing randomness from `rng`.
    ///
    /// Leaves the epoch index sequence and the generator's own random source untouched.
    pub fn get_batch_with_rng<G: Rng + ?Sized>(&self, index: usize, rng: &mut G) -> Result<PairBatch> {
        let positions = batch_positions(&self.indexes, self.config.batch_size, self.batch_count(), index)?;
        self.assembler.assemble(positions, rng)
    }

    /// Assembles several batches of the current epoch in parallel.
    ///
    /// Every batch draws from its own `ChaCha8Rng` seeded with `seed + index`, so the result does not
    /// depend on thread scheduling.
    pub fn get_batches_par(&self, indices: &[usize], seed: u64) -> Result<Vec<PairBatch>> {
        let count = self.batch_count();
        let batch_size = self.config.batch_size;
        let assembler = &self.assembler;
        let indexes = &self.indexes;

        indices
            .par_iter()
            .map(|&index| {
                let positions = batch_positions(indexes, batch_size, count, index)?;
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(index as u64));
                assembler.assemble(positions, &mut rng)
            })
            .collect()
    }

    /// Iterates over all batches of the current epoch in order.
    pub fn epoch_batches(&mut self) -> impl Iterator<Item = Result<PairBatch>> + '_ {
        let count = self.batch_count();
        (0..count).map(move |index| self.get_batch(index))
    }

    /// Rebuilds the epoch index sequence: `0..len(sample_ids)` tiled `num_turns` times, shuffled if enabled.
    pub fn on_epoch_end(&mut self) {
        let num_samples = self.assembler.sample_ids.len();
        self.indexes = (0..self.config.num_turns).flat_map(|_| 0..num_samples).collect();

        if self.config.shuffle {
            self.indexes.shuffle(&mut self.rng);
        }

        debug!(
            "rebuilt epoch index sequence with {} entries, shuffled: {}",
            self.indexes.len(),
            self.config.shuffle
        );
    }
}

/// Slice of the epoch index sequence that makes up batch `index`.
fn batch_positions(indexes: &[usize], batch_size: usize, batch_count: usize, index: usize) -> Result<&[usize]> {
    if index >= batch_count {
        return Err(GeneratorError::IndexOutOfRange { index, len: batch_count });
    }
    Ok(&indexes[index * batch_size..(index + 1) * batch_size])
}

impl<R: Rng> BatchSource for DataGenerator<R> {
    type Batch = PairBatch;

    fn batch_count(&self) -> usize {
        DataGenerator::batch_count(self)
    }

    fn get_batch(&mut self, index: usize) -> Result<PairBatch> {
        DataGenerator::get_batch(self, index)
    }

    fn on_epoch_end(&mut self) {
        DataGenerator::on_epoch_end(self)
    }
}

/// Collects the inputs of a `DataGenerator` and validates them against each other.
#[derive(Clone, Debug, Default)]
pub struct DataGeneratorBuilder {
    spectra: Option<Arc<Vec<BinnedSpectrum>>>,
    sample_ids: Option<Vec<usize>>,
    scores: Option<DMatrix<f64>>,
    identities: Option<IdentityToSpectra>,
    config: GeneratorConfig,
}

impl DataGeneratorBuilder {
    pub fn new() -> Self {
        DataGeneratorBuilder::default()
    }

    pub fn spectra(mut self, spectra: Vec<BinnedSpectrum>) -> Self {
        self.spectra = Some(Arc::new(spectra));
        self
    }

    pub fn sample_ids(mut self, sample_ids: Vec<usize>) -> Self {
        self.sample_ids = Some(sample_ids);
        self
    }

    /// Reference similarity scores, copied, NaN entries are treated as 0.
    pub fn scores(mut self, scores: &DMatrix<f64>) -> Self {
        self.scores = Some(scores.clone());
        self
    }

    pub fn identities(mut self, identities: IdentityToSpectra) -> Self {
        self.identities = Some(identities);
        self
    }

    pub fn config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds a generator drawing from a `ChaCha8Rng` seeded with `seed`.
    pub fn build_seeded(self, seed: u64) -> Result<DataGenerator<ChaCha8Rng>> {
        self.build(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Builds a generator drawing from a `ChaCha8Rng` seeded from the operating system.
    pub fn build_from_entropy(self) -> Result<DataGenerator<ChaCha8Rng>> {
        self.build(ChaCha8Rng::from_entropy())
    }

    /// Validates all inputs and builds the generator, the first epoch sequence is built right away.
    ///
    /// # Errors
    ///
    /// * `Configuration` - a required input is missing, the configuration is invalid or the
    ///   sample id list is empty.
    /// * `DataIntegrity` - a sample id is unknown to the similarity matrix, has no spectra, or a
    ///   spectrum has a bin outside `[0, dim)`.
    pub fn build<R: Rng>(self, rng: R) -> Result<DataGenerator<R>> {
        self.config.validate()?;

        let spectra = self.spectra.ok_or_else(|| GeneratorError::configuration("needs binned spectra"))?;
        let sample_ids = self.sample_ids.ok_or_else(|| GeneratorError::configuration("needs sample ids"))?;
        let scores = self.scores.ok_or_else(|| GeneratorError::configuration("needs similarity scores"))?;
        let identities = self.identities.ok_or_else(|| GeneratorError::configuration("needs identity mapping"))?;

        if sample_ids.is_empty() {
            return Err(GeneratorError::configuration("sample id list is empty"));
        }

        let scores = SimilarityMatrix::new(&scores)?;

        for &id in &sample_ids {
            if !scores.contains(id) {
                return Err(GeneratorError::data_integrity(format!(
                    "sample id {} is outside the similarity matrix with {} identities",
                    id,
                    scores.num_identities()
                )));
            }

            let members = identities.spectra_of(id);
            if members.is_empty() {
                return Err(GeneratorError::data_integrity(format!("identity {} has no associated spectra", id)));
            }
            if let Some(&position) = members.iter().find(|&&p| p >= spectra.len()) {
                return Err(GeneratorError::data_integrity(format!(
                    "identity {} references spectrum {} but only {} spectra were given",
                    id,
                    position,
                    spectra.len()
                )));
            }
        }

        let config = self.config;
        if let Some((position, bin)) = spectra
            .iter()
            .enumerate()
            .filter_map(|(p, spectrum)| spectrum.max_bin().map(|bin| (p, bin)))
            .find(|&(_, bin)| bin as usize >= config.dim)
        {
            return Err(GeneratorError::data_integrity(format!(
                "spectrum {} has bin {} outside of dimension {}",
                position, bin, config.dim
            )));
        }

        let assembler = PairBatchAssembler {
            spectra,
            sample_ids,
            scores,
            identities,
            sampler: PairSampler::from_config(&config)?,
            encoder: SpectrumEncoder::from_config(&config),
            batch_size: config.batch_size,
            dim: config.dim,
        };

        info!(
            "pair generator: {} spectra, {} sample ids, {} identities, {} batches of {} per epoch",
            assembler.spectra.len(),
            assembler.sample_ids.len(),
            assembler.scores.num_identities(),
            config.batch_count(assembler.sample_ids.len())?,
            config.batch_size
        );

        let mut generator = DataGenerator {
            assembler,
            config,
            indexes: Vec::new(),
            rng,
        };
        generator.on_epoch_end();

        Ok(generator)
    }
}
