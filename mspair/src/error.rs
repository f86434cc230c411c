use thiserror::Error;

/// Errors raised while configuring the generator or assembling a batch.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Missing inputs, invalid numeric settings or malformed similarity bands.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Batch index outside `[0, batch_count())`.
    #[error("batch index {index} out of range, generator holds {len} batches")]
    IndexOutOfRange { index: usize, len: usize },

    /// Inputs that disagree with each other, e.g. an identity without spectra.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GeneratorError>;

impl GeneratorError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        GeneratorError::Configuration(msg.into())
    }

    pub fn data_integrity(msg: impl Into<String>) -> Self {
        GeneratorError::DataIntegrity(msg.into())
    }
}
