//! The loaded tokenizer/classifier pair and the prediction path.

use crate::config::ServiceConfig;
use crate::device::device_label;
use crate::error::{Result, SentimentError};
use crate::loaders::{self, ModelVariant};
use crate::models::ElectraForSequenceClassification;
use candle_core::{Device, Tensor, D};
use candle_nn::ops::softmax;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use tokenizers::Tokenizer;

/// Which model produced a prediction.
#[derive(Debug, Clone, Serialize)]
pub struct ModelProvenance {
    /// Display name of the model family.
    pub model_name: String,
    /// Checkpoint flavor the prediction came from.
    pub variant: ModelVariant,
    /// Device the forward pass ran on.
    pub device: &'static str,
}

/// A single sentiment prediction.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// The input text as received.
    pub text: String,
    /// Predicted label.
    pub sentiment: String,
    /// Probability of the predicted label, rounded to 4 digits.
    pub confidence: f32,
    /// Per-label probabilities, each independently rounded to 4 digits. The
    /// rounded pair may not sum to exactly 1; these are display values, not
    /// inputs for further arithmetic.
    pub probabilities: BTreeMap<String, f32>,
    /// Which model produced this prediction.
    pub model_info: ModelProvenance,
}

/// One entry of a batch response: the input text plus its outcome.
#[derive(Debug)]
pub struct BatchResult {
    /// Input text.
    pub text: String,
    /// Prediction or error for this input.
    pub prediction: Result<Prediction>,
}

impl Serialize for BatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        match &self.prediction {
            Ok(prediction) => prediction.serialize(serializer),
            Err(e) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("text", &self.text)?;
                map.serialize_entry("error", &e.to_string())?;
                map.end()
            }
        }
    }
}

/// Batch response: per-item outcomes in input order plus summary counts.
#[derive(Debug, Serialize)]
pub struct BatchOutput {
    /// One outcome per input, in input order.
    pub results: Vec<BatchResult>,
    /// Number of inputs.
    pub total_count: usize,
    /// Number of successful predictions.
    pub success_count: usize,
    /// Number of failed items.
    pub error_count: usize,
}

/// A tokenizer and classifier bound to one checkpoint and one device.
///
/// Immutable after construction; the service swaps whole pipelines on reload,
/// never individual weights, so concurrent readers always see a consistent
/// pair.
pub(crate) struct SentimentPipeline {
    model: ElectraForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
    labels: [String; 2],
    variant: ModelVariant,
    source: String,
    model_name: String,
}

impl SentimentPipeline {
    /// Locate the checkpoint and materialize the tokenizer/model pair.
    pub fn load(config: &ServiceConfig, device: &Device) -> Result<Self> {
        let checkpoint = loaders::resolve(config)?;
        let tokenizer = loaders::load_tokenizer(&checkpoint.tokenizer, config.max_length)?;
        let model = loaders::load_model(&checkpoint, device)?;
        Ok(Self {
            model,
            tokenizer,
            device: device.clone(),
            labels: config.labels.clone(),
            variant: checkpoint.variant,
            source: checkpoint.source,
            model_name: config.model_name.clone(),
        })
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn provenance(&self) -> ModelProvenance {
        ModelProvenance {
            model_name: self.model_name.clone(),
            variant: self.variant,
            device: device_label(&self.device),
        }
    }

    /// One forward pass over already-normalized text.
    pub fn predict(&self, text: &str, normalized: &str) -> Result<Prediction> {
        let encoding = self.tokenizer.encode(normalized, true).map_err(|e| {
            SentimentError::Tokenization(format!(
                "Tokenization failed on '{}': {e}",
                &normalized.chars().take(50).collect::<String>()
            ))
        })?;

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let attention_mask =
            Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        let logits = self
            .model
            .forward(&input_ids, &attention_mask)
            .map_err(|e| SentimentError::Inference(e.to_string()))?;
        let probs = softmax(&logits, D::Minus1)?.squeeze(0)?.to_vec1::<f32>()?;

        let prediction = build_prediction(text, &probs, &self.labels, self.provenance())?;
        tracing::debug!(
            text = %text.chars().take(50).collect::<String>(),
            sentiment = %prediction.sentiment,
            confidence = prediction.confidence,
            "prediction complete"
        );
        Ok(prediction)
    }
}

fn round4(x: f32) -> f32 {
    (x * 10_000.0).round() / 10_000.0
}

/// Turn a probability distribution into a labeled, confidence-scored result.
/// Index 0 maps to the negative label, index 1 to the positive one.
fn build_prediction(
    text: &str,
    probs: &[f32],
    labels: &[String; 2],
    model_info: ModelProvenance,
) -> Result<Prediction> {
    let (predicted, &confidence) = probs
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| SentimentError::Inference("model returned no logits".to_string()))?;

    let sentiment = labels
        .get(predicted)
        .ok_or_else(|| {
            SentimentError::Inference(format!("predicted class {predicted} has no label"))
        })?
        .clone();

    let probabilities = labels
        .iter()
        .cloned()
        .zip(probs.iter().map(|&p| round4(p)))
        .collect();

    Ok(Prediction {
        text: text.to_string(),
        sentiment,
        confidence: round4(confidence),
        probabilities,
        model_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> [String; 2] {
        ["부정".to_string(), "긍정".to_string()]
    }

    fn provenance() -> ModelProvenance {
        ModelProvenance {
            model_name: "KoELECTRA".to_string(),
            variant: ModelVariant::Base,
            device: "cpu",
        }
    }

    #[test]
    fn positive_distribution_maps_to_the_positive_label() {
        let p = build_prediction(
            "이 영화는 정말 재미있어요!",
            &[0.08, 0.92],
            &labels(),
            provenance(),
        )
        .unwrap();
        assert_eq!(p.sentiment, "긍정");
        assert!((p.confidence - 0.92).abs() < 1e-6);
        assert!((p.probabilities["부정"] - 0.08).abs() < 1e-6);
        assert!((p.probabilities["긍정"] - 0.92).abs() < 1e-6);
    }

    #[test]
    fn confidence_equals_the_maximum_probability() {
        let p = build_prediction("t", &[0.66669, 0.33331], &labels(), provenance()).unwrap();
        assert_eq!(p.sentiment, "부정");
        assert!((p.confidence - p.probabilities["부정"]).abs() < 1e-7);
    }

    #[test]
    fn values_are_rounded_to_four_digits() {
        let p = build_prediction("t", &[0.123456, 0.876544], &labels(), provenance()).unwrap();
        assert!((p.confidence - 0.8765).abs() < 1e-6);
        assert!((p.probabilities["부정"] - 0.1235).abs() < 1e-6);
    }

    #[test]
    fn batch_error_items_serialize_with_a_reason() {
        let item = BatchResult {
            text: "".to_string(),
            prediction: Err(SentimentError::EmptyText),
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["error"], "empty text");

        let ok = BatchResult {
            text: "좋다".to_string(),
            prediction: build_prediction("좋다", &[0.2, 0.8], &labels(), provenance()),
        };
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["sentiment"], "긍정");
    }
}
