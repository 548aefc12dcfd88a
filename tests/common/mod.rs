//! Shared helpers: synthetic checkpoints small enough to run on CPU.

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use koelectra_sentiment::models::{ElectraConfig, ElectraForSequenceClassification};
use koelectra_sentiment::{SentimentService, ServiceConfig};
use std::path::Path;

pub const VOCAB: &str = "[PAD]\n[UNK]\n[CLS]\n[SEP]\n[MASK]\n\
이\n영화\n##는\n정말\n재미\n##있\n##어요\n!\n\
좋\n##다\n나쁘\n배우\n연기\n##가\n스토리\n최고\n최악\n훌륭\n##했어요\n지루\n##한\n";

pub fn tiny_config_json() -> serde_json::Value {
    serde_json::json!({
        "vocab_size": 32,
        "embedding_size": 16,
        "hidden_size": 32,
        "num_hidden_layers": 2,
        "num_attention_heads": 4,
        "intermediate_size": 64,
        "max_position_embeddings": 64,
    })
}

/// Write a complete checkpoint directory: config, WordPiece vocabulary, and a
/// freshly initialized safetensors weight file with `num_labels` output
/// classes.
pub fn write_checkpoint(dir: &Path, num_labels: usize) {
    std::fs::create_dir_all(dir).unwrap();
    let config_json = tiny_config_json();
    std::fs::write(dir.join("config.json"), config_json.to_string()).unwrap();
    std::fs::write(dir.join("vocab.txt"), VOCAB).unwrap();

    let config: ElectraConfig = serde_json::from_value(config_json).unwrap();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    ElectraForSequenceClassification::load(vb, &config, num_labels).unwrap();
    varmap.save(dir.join("model.safetensors")).unwrap();
}

/// Config rooted in a temp dir, with the hub fallback disabled so missing
/// directories fail fast and offline.
pub fn service_config(root: &Path) -> ServiceConfig {
    ServiceConfig {
        finetuned_model_dir: root.join("finetuned"),
        base_model_dir: root.join("base"),
        hub_repo: None,
        ..ServiceConfig::default()
    }
}

pub fn cpu_service(config: ServiceConfig) -> SentimentService {
    SentimentService::builder(config).cpu().build().unwrap()
}
