//! Checkpoint location, tokenizer construction, and weight reconciliation.
//!
//! A checkpoint is a read-only directory holding `config.json`, a weight file
//! (`model.safetensors` preferred, `pytorch_model.bin` as fallback) and
//! tokenizer artifacts (`tokenizer.json`, or `vocab.txt` for WordPiece
//! vocabularies). When no local checkpoint directory exists, the base model
//! can be fetched from the Hugging Face Hub instead.

use crate::config::{ServiceConfig, NUM_LABELS};
use crate::error::{Result, SentimentError};
use crate::models::{ElectraConfig, ElectraForSequenceClassification};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};

/// Which checkpoint flavor a pipeline was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Locally fine-tuned checkpoint.
    Finetuned,
    /// Local base checkpoint.
    Base,
    /// Base checkpoint fetched from the Hugging Face Hub.
    Hub,
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelVariant::Finetuned => "finetuned",
            ModelVariant::Base => "base",
            ModelVariant::Hub => "hub",
        };
        write!(f, "{name}")
    }
}

pub(crate) enum TokenizerSource {
    TokenizerJson(PathBuf),
    WordPieceVocab(PathBuf),
}

/// Resolved file paths for one checkpoint.
pub(crate) struct Checkpoint {
    pub source: String,
    pub variant: ModelVariant,
    pub config: PathBuf,
    pub weights: PathBuf,
    pub tokenizer: TokenizerSource,
}

/// Pick the checkpoint directory: the fine-tuned one when it exists, the base
/// one otherwise. Whether the chosen directory exists is the loader's problem.
pub(crate) fn select_checkpoint(config: &ServiceConfig) -> (PathBuf, ModelVariant) {
    if config.finetuned_model_dir.exists() {
        tracing::info!(path = %config.finetuned_model_dir.display(), "using fine-tuned checkpoint");
        (config.finetuned_model_dir.clone(), ModelVariant::Finetuned)
    } else {
        tracing::info!(path = %config.base_model_dir.display(), "using base checkpoint");
        (config.base_model_dir.clone(), ModelVariant::Base)
    }
}

/// Resolve the selected checkpoint into concrete file paths, falling back to
/// the Hub when the directory is missing and a repository is configured.
pub(crate) fn resolve(config: &ServiceConfig) -> Result<Checkpoint> {
    let (dir, variant) = select_checkpoint(config);
    if dir.exists() {
        return Checkpoint::from_dir(&dir, variant);
    }
    match &config.hub_repo {
        Some(repo) => Checkpoint::from_hub(repo),
        None => Err(SentimentError::ModelNotFound(format!(
            "checkpoint directory {} does not exist and no hub repository is configured",
            dir.display()
        ))),
    }
}

impl Checkpoint {
    fn from_dir(dir: &Path, variant: ModelVariant) -> Result<Self> {
        let config = dir.join("config.json");
        if !config.exists() {
            return Err(SentimentError::ModelFormat(format!(
                "missing config.json in {}",
                dir.display()
            )));
        }

        let weights = ["model.safetensors", "pytorch_model.bin"]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
            .ok_or_else(|| {
                SentimentError::ModelFormat(format!(
                    "no weight file (model.safetensors or pytorch_model.bin) in {}",
                    dir.display()
                ))
            })?;

        let tokenizer_json = dir.join("tokenizer.json");
        let vocab = dir.join("vocab.txt");
        let tokenizer = if tokenizer_json.exists() {
            TokenizerSource::TokenizerJson(tokenizer_json)
        } else if vocab.exists() {
            TokenizerSource::WordPieceVocab(vocab)
        } else {
            return Err(SentimentError::ModelFormat(format!(
                "no tokenizer artifacts (tokenizer.json or vocab.txt) in {}",
                dir.display()
            )));
        };

        Ok(Self {
            source: dir.display().to_string(),
            variant,
            config,
            weights,
            tokenizer,
        })
    }

    fn from_hub(repo_id: &str) -> Result<Self> {
        tracing::info!(repo = repo_id, "no local checkpoint, fetching from the hub");
        let api = Api::new()?;
        let repo = api.repo(Repo::new(repo_id.to_string(), RepoType::Model));

        let config = repo.get("config.json")?;
        let weights = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))?;
        let tokenizer = match repo.get("tokenizer.json") {
            Ok(path) => TokenizerSource::TokenizerJson(path),
            Err(_) => TokenizerSource::WordPieceVocab(repo.get("vocab.txt")?),
        };

        Ok(Self {
            source: repo_id.to_string(),
            variant: ModelVariant::Hub,
            config,
            weights,
            tokenizer,
        })
    }
}

/// Build the tokenizer for a checkpoint, configured for truncation at
/// `max_length` and dynamic (batch-longest) padding.
pub(crate) fn load_tokenizer(source: &TokenizerSource, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = match source {
        TokenizerSource::TokenizerJson(path) => Tokenizer::from_file(path).map_err(|e| {
            SentimentError::Tokenization(format!(
                "Failed to load tokenizer from '{}': {e}",
                path.display()
            ))
        })?,
        TokenizerSource::WordPieceVocab(path) => wordpiece_from_vocab(path)?,
    };

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| SentimentError::Tokenization(format!("Invalid truncation params: {e}")))?;

    let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);
    tokenizer.with_padding(Some(PaddingParams {
        pad_id,
        pad_token: "[PAD]".to_string(),
        ..Default::default()
    }));

    Ok(tokenizer)
}

fn wordpiece_from_vocab(vocab: &Path) -> Result<Tokenizer> {
    let wordpiece = WordPiece::from_file(&vocab.to_string_lossy())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| {
            SentimentError::Tokenization(format!("Failed to build WordPiece model: {e}"))
        })?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    // KoELECTRA vocabularies are cased; keep accents and casing intact.
    tokenizer.with_normalizer(Some(BertNormalizer::new(true, true, None, false)));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));

    let sep = tokenizer.token_to_id("[SEP]").ok_or_else(|| {
        SentimentError::Tokenization(format!("vocabulary {} has no [SEP] token", vocab.display()))
    })?;
    let cls = tokenizer.token_to_id("[CLS]").ok_or_else(|| {
        SentimentError::Tokenization(format!("vocabulary {} has no [CLS] token", vocab.display()))
    })?;
    tokenizer.with_post_processor(Some(BertProcessing::new(
        ("[SEP]".to_string(), sep),
        ("[CLS]".to_string(), cls),
    )));

    Ok(tokenizer)
}

fn read_weights(path: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let tensors = if path.extension().is_some_and(|e| e == "safetensors") {
        candle_core::safetensors::load(path, device)
    } else {
        candle_core::pickle::read_all(path).map(|pairs| pairs.into_iter().collect())
    };
    tensors.map_err(|e| {
        SentimentError::ModelFormat(format!(
            "failed to read weights from {}: {e}",
            path.display()
        ))
    })
}

const HEAD_WEIGHT: &str = "classifier.out_proj.weight";
const HEAD_BIAS: &str = "classifier.out_proj.bias";

/// Build a two-class classifier from a checkpoint.
///
/// The network is constructed fresh, then every stored tensor whose name and
/// shape match a network tensor is copied over. Tensors without a compatible
/// counterpart (notably the classification head when the checkpoint was
/// trained with a different class count) keep their fresh initialization, and
/// in that case the head is explicitly re-initialized from
/// `N(0, initializer_range²)` with zero bias. A compatible stored head is kept
/// as-is, so a fine-tuned checkpoint predicts with the head it was trained
/// with.
pub(crate) fn load_model(
    checkpoint: &Checkpoint,
    device: &Device,
) -> Result<ElectraForSequenceClassification> {
    let raw = std::fs::read_to_string(&checkpoint.config)?;
    let config: ElectraConfig = serde_json::from_str(&raw)
        .map_err(|e| SentimentError::ModelFormat(format!("invalid config.json: {e}")))?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = ElectraForSequenceClassification::load(vb, &config, NUM_LABELS)?;

    let stored = read_weights(&checkpoint.weights, device)?;

    let mut copied = 0usize;
    let mut initialized = 0usize;
    let mut head_copied = 0usize;
    let head_reinitialized;
    {
        let data = varmap.data().lock().unwrap();
        for (name, var) in data.iter() {
            match stored.get(name) {
                Some(tensor) if tensor.shape() == var.shape() => {
                    var.set(&tensor.to_dtype(var.dtype())?.to_device(device)?)?;
                    copied += 1;
                    if name == HEAD_WEIGHT || name == HEAD_BIAS {
                        head_copied += 1;
                    }
                }
                _ => initialized += 1,
            }
        }

        // A partially copied head is as unusable as a missing one.
        head_reinitialized = head_copied < 2;
        if head_reinitialized {
            for (name, var) in data.iter() {
                if name == HEAD_WEIGHT {
                    let std = config.initializer_range as f32;
                    var.set(&Tensor::randn(0f32, std, var.dims().to_vec(), device)?)?;
                } else if name == HEAD_BIAS {
                    var.set(&Tensor::zeros(var.dims().to_vec(), var.dtype(), device)?)?;
                }
            }
        }
    }

    tracing::info!(
        copied,
        initialized,
        head_reinitialized,
        source = %checkpoint.source,
        "checkpoint weights reconciled"
    );

    Ok(model)
}
