use std::cmp::Reverse;
use itertools::Itertools;
use log::{trace, warn};
use ordered_float::OrderedFloat;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::{FallbackStrategy, GeneratorConfig, SimilarityBand};
use crate::data::similarity::SimilarityMatrix;
use crate::error::{GeneratorError, Result};

/// Amount by which both band bounds are relaxed per failed attempt.
pub const WIDEN_STEP: f64 = 0.1;

/// Number of band matching attempts, the first one without widening.
pub const MAX_WIDEN_STEPS: usize = 4;

/// Picks partner identities whose similarity to an anchor falls into a randomly chosen band.
#[derive(Clone, Debug)]
pub struct PairSampler {
    bands: Vec<SimilarityBand>,
    ignore_equal_pairs: bool,
    fallback: FallbackStrategy,
}

impl PairSampler {
    pub fn new(bands: Vec<SimilarityBand>, ignore_equal_pairs: bool, fallback: FallbackStrategy) -> Result<Self> {
        if bands.is_empty() {
            return Err(GeneratorError::configuration("pair sampler needs at least one similarity band"));
        }
        Ok(PairSampler { bands, ignore_equal_pairs, fallback })
    }

    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        PairSampler::new(config.same_prob_bins.clone(), config.ignore_equal_pairs, config.fallback)
    }

    /// Draws a partner for the anchor found at `anchor_position` in `sample_ids`.
    ///
    /// # Arguments
    ///
    /// * `anchor_position` - position of the anchor identity inside `sample_ids`.
    /// * `sample_ids` - identities eligible as partners, duplicates raise their weight.
    /// * `scores` - reference similarities between identities.
    /// * `rng` - random source for band and candidate choice.
    ///
    /// # Returns
    ///
    /// The pair `(anchor, partner)` as identity indices.
    pub fn sample_pair<R: Rng + ?Sized>(
        &self,
        anchor_position: usize,
        sample_ids: &[usize],
        scores: &SimilarityMatrix,
        rng: &mut R,
    ) -> (usize, usize) {
        let anchor = sample_ids[anchor_position];
        let band = self.bands[rng.gen_range(0..self.bands.len())];

        let partner = match self.match_in_band(anchor, band, sample_ids, scores, rng) {
            Some(partner) => partner,
            None => {
                let partner = self.fallback_partner(anchor_position, sample_ids, scores);
                warn!(
                    "no partner for identity {} within ({:.2}, {:.2}], picked most similar identity {}",
                    anchor,
                    band.low - WIDEN_STEP * (MAX_WIDEN_STEPS - 1) as f64,
                    band.high + WIDEN_STEP * (MAX_WIDEN_STEPS - 1) as f64,
                    partner
                );
                partner
            }
        };

        (anchor, partner)
    }

    /// Searches `sample_ids` for identities scoring inside `band`, widening it on failure.
    ///
    /// Returns `None` once all `MAX_WIDEN_STEPS` attempts came up empty.
    pub fn match_in_band<R: Rng + ?Sized>(
        &self,
        anchor: usize,
        band: SimilarityBand,
        sample_ids: &[usize],
        scores: &SimilarityMatrix,
        rng: &mut R,
    ) -> Option<usize> {
        for step in 0..MAX_WIDEN_STEPS {
            let widen = step as f64 * WIDEN_STEP;

            let candidates: Vec<usize> = sample_ids
                .iter()
                .positions(|&id| {
                    !(self.ignore_equal_pairs && id == anchor) && band.contains(scores.score(anchor, id), widen)
                })
                .collect();

            if let Some(&position) = candidates.choose(rng) {
                return Some(sample_ids[position]);
            }

            trace!("identity {}: no candidate within band {:?} widened by {:.1}", anchor, band, widen);
        }

        None
    }

    /// Deterministic partner: the most similar identity other than the anchor.
    ///
    /// Ties resolve to the first position. Only when `sample_ids` consists of the anchor alone
    /// (possibly repeated) is the anchor itself returned.
    pub fn fallback_partner(&self, anchor_position: usize, sample_ids: &[usize], scores: &SimilarityMatrix) -> usize {
        let anchor = sample_ids[anchor_position];
        let others: Vec<usize> = sample_ids.iter().copied().filter(|&id| id != anchor).collect();

        let best = match others.iter().position_min_by_key(|&&id| Reverse(OrderedFloat(scores.score(anchor, id)))) {
            Some(best) => best,
            None => {
                warn!("identity {} has no other identity to pair with", anchor);
                return anchor;
            }
        };

        match self.fallback {
            FallbackStrategy::ExcludedArgMax => others[best],
            FallbackStrategy::PositionalShift => {
                // map the position in `others` back onto `sample_ids` by skipping the anchor's slot
                let shifted = if best >= anchor_position { best + 1 } else { best };
                match sample_ids.get(shifted) {
                    Some(&id) if id != anchor => id,
                    _ => {
                        warn!(
                            "positional fallback for identity {} landed on position {}, using arg-max over other identities",
                            anchor, shifted
                        );
                        others[best]
                    }
                }
            }
        }
    }
}
