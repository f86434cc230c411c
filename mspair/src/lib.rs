// data module
pub mod data {
    pub mod spectrum;
    pub mod similarity;
    pub mod identity;
    pub mod dataset;
}

// algorithm module
pub mod algorithm {
    pub mod augmentation;
    pub mod pair_sampler;
}

pub mod config;
pub mod error;
pub mod generator;

pub use config::{FallbackStrategy, GeneratorConfig, PeakRemovalConfig, SimilarityBand};
pub use error::{GeneratorError, Result};
pub use generator::{BatchSource, DataGenerator, DataGeneratorBuilder, PairBatch};
