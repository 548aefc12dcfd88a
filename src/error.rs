//! Error types for this crate.
//!
//! All fallible operations return [`Result<T>`] which uses [`SentimentError`]
//! as the error type. Prediction-path failures are always structured values
//! with a human-readable reason; nothing at the public boundary panics on bad
//! input or a bad checkpoint.

use thiserror::Error;

/// A [`Result`](std::result::Result) alias using [`SentimentError`] as the error type.
pub type Result<T> = std::result::Result<T, SentimentError>;

/// The unified error type for all crate errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SentimentError {
    // Checkpoint location and loading
    #[error("Model checkpoint not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid model checkpoint: {0}")]
    ModelFormat(String),

    #[error("Download failed: {0}")]
    Download(String),

    // Tokenization
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    // Prediction
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("empty text")]
    EmptyText,

    #[error("text is {len} characters, limit is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("batch is empty")]
    EmptyBatch,

    #[error("batch has {len} items, limit is {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("Inference failed: {0}")]
    Inference(String),

    // Device
    #[error("Device error: {0}")]
    Device(String),

    // Pass-through from dependencies
    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl From<hf_hub::api::sync::ApiError> for SentimentError {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        SentimentError::Download(value.to_string())
    }
}
