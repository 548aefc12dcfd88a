//! Service configuration.
//!
//! Defaults mirror the operational setup: checkpoints under `models/`,
//! 512-token sequences, up to 1000 characters per text and 50 texts per batch,
//! Korean labels with index 0 negative and index 1 positive.

use crate::error::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Number of sentiment classes the classifier is built with. Index 0 is the
/// negative label, index 1 the positive one.
pub const NUM_LABELS: usize = 2;

/// Configuration for a [`SentimentService`](crate::SentimentService).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Display name used in prediction provenance and model info.
    pub model_name: String,
    /// Checkpoint directory produced by fine-tuning. Preferred when present.
    pub finetuned_model_dir: PathBuf,
    /// Pristine base checkpoint directory.
    pub base_model_dir: PathBuf,
    /// Hub repository to fetch the base checkpoint from when no local
    /// checkpoint directory exists. `None` disables the fallback.
    pub hub_repo: Option<String>,
    /// Token count the tokenizer truncates to.
    pub max_length: usize,
    /// Maximum accepted text length in characters, after normalization.
    pub max_text_chars: usize,
    /// Maximum number of texts accepted per batch call.
    pub max_batch_size: usize,
    /// Class labels, negative first.
    pub labels: [String; 2],
    /// Load the model at service construction instead of on the first call.
    pub preload: bool,
    /// Sentence the health check runs through the full inference path.
    pub probe_text: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_name: "KoELECTRA".to_string(),
            finetuned_model_dir: PathBuf::from("models/koelectra_finetuned"),
            base_model_dir: PathBuf::from("models/koelectra_base"),
            hub_repo: Some("monologg/koelectra-small-v3-discriminator".to_string()),
            max_length: 512,
            max_text_chars: 1000,
            max_batch_size: 50,
            labels: ["부정".to_string(), "긍정".to_string()],
            preload: false,
            probe_text: "이 영화는 정말 재미있어요!".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Read a configuration from a JSON file. Missing fields keep their
    /// default values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_service_contract() {
        let config = ServiceConfig::default();
        assert_eq!(config.max_length, 512);
        assert_eq!(config.max_text_chars, 1000);
        assert_eq!(config.max_batch_size, 50);
        assert_eq!(config.labels, ["부정".to_string(), "긍정".to_string()]);
        assert!(!config.preload);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.json");
        std::fs::write(&path, r#"{"max_batch_size": 8, "hub_repo": null}"#).unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.max_batch_size, 8);
        assert_eq!(config.hub_repo, None);
        assert_eq!(config.max_length, 512);
    }
}
