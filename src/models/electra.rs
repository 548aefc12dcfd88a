//! ELECTRA discriminator encoder with a sequence-classification head.
//!
//! The module tree mirrors Hugging Face's `ElectraForSequenceClassification`
//! (`electra.embeddings.*`, `electra.encoder.layer.{i}.*`, `classifier.*`) so
//! that tensors in an on-disk state dict can be matched by name. Small ELECTRA
//! variants use an embedding size below the hidden size and carry an extra
//! `embeddings_project` linear layer between the two.
//!
//! Inference only: dropout is not applied and no gradients are tracked.

use candle_core::{DType, IndexOp, Result, Tensor, D};
use candle_nn::{embedding, layer_norm, ops::softmax, Embedding, LayerNorm, Module, VarBuilder};
use candle_transformers::models::with_tracing::{linear, Linear};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HiddenAct {
    Gelu,
    #[serde(rename = "gelu_new")]
    GeluApproximate,
    Relu,
}

impl HiddenAct {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            HiddenAct::Gelu => xs.gelu_erf(),
            HiddenAct::GeluApproximate => xs.gelu(),
            HiddenAct::Relu => xs.relu(),
        }
    }
}

fn default_embedding_size() -> usize {
    128
}

fn default_hidden_act() -> HiddenAct {
    HiddenAct::Gelu
}

fn default_max_position_embeddings() -> usize {
    512
}

fn default_type_vocab_size() -> usize {
    2
}

fn default_layer_norm_eps() -> f64 {
    1e-12
}

fn default_initializer_range() -> f64 {
    0.02
}

/// Subset of the checkpoint `config.json` this implementation needs.
/// Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ElectraConfig {
    pub vocab_size: usize,
    #[serde(default = "default_embedding_size")]
    pub embedding_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    #[serde(default = "default_hidden_act")]
    pub hidden_act: HiddenAct,
    #[serde(default = "default_max_position_embeddings")]
    pub max_position_embeddings: usize,
    #[serde(default = "default_type_vocab_size")]
    pub type_vocab_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    #[serde(default = "default_initializer_range")]
    pub initializer_range: f64,
}

struct ElectraEmbeddings {
    word_embeddings: Embedding,
    position_embeddings: Embedding,
    token_type_embeddings: Embedding,
    layer_norm: LayerNorm,
    span: tracing::Span,
}

impl ElectraEmbeddings {
    fn load(cfg: &ElectraConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            word_embeddings: embedding(
                cfg.vocab_size,
                cfg.embedding_size,
                vb.pp("word_embeddings"),
            )?,
            position_embeddings: embedding(
                cfg.max_position_embeddings,
                cfg.embedding_size,
                vb.pp("position_embeddings"),
            )?,
            token_type_embeddings: embedding(
                cfg.type_vocab_size,
                cfg.embedding_size,
                vb.pp("token_type_embeddings"),
            )?,
            layer_norm: layer_norm(cfg.embedding_size, cfg.layer_norm_eps, vb.pp("LayerNorm"))?,
            span: tracing::span!(tracing::Level::TRACE, "embeddings"),
        })
    }

    fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let _enter = self.span.enter();
        let (_batch, seq_len) = input_ids.dims2()?;
        let words = self.word_embeddings.forward(input_ids)?;
        let position_ids =
            Tensor::arange(0u32, seq_len as u32, input_ids.device())?.unsqueeze(0)?;
        let positions = self.position_embeddings.forward(&position_ids)?;
        // Single-segment inputs only: token type ids are all zero.
        let token_types = self
            .token_type_embeddings
            .forward(&position_ids.zeros_like()?)?;
        let embeddings = words.broadcast_add(&positions)?.broadcast_add(&token_types)?;
        self.layer_norm.forward(&embeddings)
    }
}

struct ElectraSelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    num_attention_heads: usize,
    attention_head_size: usize,
    span: tracing::Span,
}

impl ElectraSelfAttention {
    fn load(cfg: &ElectraConfig, vb: VarBuilder) -> Result<Self> {
        let attention_head_size = cfg.hidden_size / cfg.num_attention_heads;
        let all_head_size = cfg.num_attention_heads * attention_head_size;
        Ok(Self {
            query: linear(cfg.hidden_size, all_head_size, vb.pp("query"))?,
            key: linear(cfg.hidden_size, all_head_size, vb.pp("key"))?,
            value: linear(cfg.hidden_size, all_head_size, vb.pp("value"))?,
            num_attention_heads: cfg.num_attention_heads,
            attention_head_size,
            span: tracing::span!(tracing::Level::TRACE, "self-attn"),
        })
    }

    fn transpose_for_scores(&self, xs: &Tensor) -> Result<Tensor> {
        let mut shape = xs.dims().to_vec();
        shape.pop();
        shape.push(self.num_attention_heads);
        shape.push(self.attention_head_size);
        xs.reshape(shape)?.transpose(1, 2)?.contiguous()
    }

    fn forward(&self, hidden_states: &Tensor, attention_bias: &Tensor) -> Result<Tensor> {
        let _enter = self.span.enter();
        let query = self.transpose_for_scores(&self.query.forward(hidden_states)?)?;
        let key = self.transpose_for_scores(&self.key.forward(hidden_states)?)?;
        let value = self.transpose_for_scores(&self.value.forward(hidden_states)?)?;

        let scale = 1f64 / (self.attention_head_size as f64).sqrt();
        let scores = (query.matmul(&key.t()?)? * scale)?;
        let scores = scores.broadcast_add(attention_bias)?;
        let probs = softmax(&scores, D::Minus1)?;

        let context = probs.matmul(&value)?;
        context.transpose(1, 2)?.contiguous()?.flatten_from(D::Minus2)
    }
}

struct ElectraSelfOutput {
    dense: Linear,
    layer_norm: LayerNorm,
}

impl ElectraSelfOutput {
    fn load(cfg: &ElectraConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            dense: linear(cfg.hidden_size, cfg.hidden_size, vb.pp("dense"))?,
            layer_norm: layer_norm(cfg.hidden_size, cfg.layer_norm_eps, vb.pp("LayerNorm"))?,
        })
    }

    fn forward(&self, hidden_states: &Tensor, input: &Tensor) -> Result<Tensor> {
        let hidden_states = self.dense.forward(hidden_states)?;
        self.layer_norm.forward(&(hidden_states + input)?)
    }
}

struct ElectraAttention {
    self_attention: ElectraSelfAttention,
    output: ElectraSelfOutput,
}

impl ElectraAttention {
    fn load(cfg: &ElectraConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            self_attention: ElectraSelfAttention::load(cfg, vb.pp("self"))?,
            output: ElectraSelfOutput::load(cfg, vb.pp("output"))?,
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_bias: &Tensor) -> Result<Tensor> {
        let attention = self.self_attention.forward(hidden_states, attention_bias)?;
        self.output.forward(&attention, hidden_states)
    }
}

struct ElectraIntermediate {
    dense: Linear,
    act: HiddenAct,
}

impl ElectraIntermediate {
    fn load(cfg: &ElectraConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            dense: linear(cfg.hidden_size, cfg.intermediate_size, vb.pp("dense"))?,
            act: cfg.hidden_act,
        })
    }

    fn forward(&self, hidden_states: &Tensor) -> Result<Tensor> {
        self.act.forward(&self.dense.forward(hidden_states)?)
    }
}

struct ElectraOutput {
    dense: Linear,
    layer_norm: LayerNorm,
}

impl ElectraOutput {
    fn load(cfg: &ElectraConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            dense: linear(cfg.intermediate_size, cfg.hidden_size, vb.pp("dense"))?,
            layer_norm: layer_norm(cfg.hidden_size, cfg.layer_norm_eps, vb.pp("LayerNorm"))?,
        })
    }

    fn forward(&self, hidden_states: &Tensor, input: &Tensor) -> Result<Tensor> {
        let hidden_states = self.dense.forward(hidden_states)?;
        self.layer_norm.forward(&(hidden_states + input)?)
    }
}

struct ElectraLayer {
    attention: ElectraAttention,
    intermediate: ElectraIntermediate,
    output: ElectraOutput,
}

impl ElectraLayer {
    fn load(cfg: &ElectraConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            attention: ElectraAttention::load(cfg, vb.pp("attention"))?,
            intermediate: ElectraIntermediate::load(cfg, vb.pp("intermediate"))?,
            output: ElectraOutput::load(cfg, vb.pp("output"))?,
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_bias: &Tensor) -> Result<Tensor> {
        let attention = self.attention.forward(hidden_states, attention_bias)?;
        let intermediate = self.intermediate.forward(&attention)?;
        self.output.forward(&intermediate, &attention)
    }
}

struct ElectraEncoder {
    layers: Vec<ElectraLayer>,
    span: tracing::Span,
}

impl ElectraEncoder {
    fn load(cfg: &ElectraConfig, vb: VarBuilder) -> Result<Self> {
        let vb_layers = vb.pp("layer");
        let layers = (0..cfg.num_hidden_layers)
            .map(|index| ElectraLayer::load(cfg, vb_layers.pp(index)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            span: tracing::span!(tracing::Level::TRACE, "encoder"),
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_bias: &Tensor) -> Result<Tensor> {
        let _enter = self.span.enter();
        let mut hidden_states = hidden_states.clone();
        for layer in &self.layers {
            hidden_states = layer.forward(&hidden_states, attention_bias)?;
        }
        Ok(hidden_states)
    }
}

/// The ELECTRA discriminator encoder.
pub struct ElectraModel {
    embeddings: ElectraEmbeddings,
    embeddings_project: Option<Linear>,
    encoder: ElectraEncoder,
}

impl ElectraModel {
    pub fn load(vb: VarBuilder, cfg: &ElectraConfig) -> Result<Self> {
        let embeddings = ElectraEmbeddings::load(cfg, vb.pp("embeddings"))?;
        let embeddings_project = if cfg.embedding_size != cfg.hidden_size {
            Some(linear(
                cfg.embedding_size,
                cfg.hidden_size,
                vb.pp("embeddings_project"),
            )?)
        } else {
            None
        };
        let encoder = ElectraEncoder::load(cfg, vb.pp("encoder"))?;
        Ok(Self {
            embeddings,
            embeddings_project,
            encoder,
        })
    }

    /// Returns the final hidden states, shape `(batch, seq_len, hidden_size)`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let attention_bias = extended_attention_mask(attention_mask, DType::F32)?;
        let mut hidden_states = self.embeddings.forward(input_ids)?;
        if let Some(project) = &self.embeddings_project {
            hidden_states = project.forward(&hidden_states)?;
        }
        self.encoder.forward(&hidden_states, &attention_bias)
    }
}

struct ElectraClassificationHead {
    dense: Linear,
    out_proj: Linear,
}

impl ElectraClassificationHead {
    fn load(cfg: &ElectraConfig, num_labels: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            dense: linear(cfg.hidden_size, cfg.hidden_size, vb.pp("dense"))?,
            out_proj: linear(cfg.hidden_size, num_labels, vb.pp("out_proj"))?,
        })
    }

    fn forward(&self, hidden_states: &Tensor) -> Result<Tensor> {
        // Classify on the first ([CLS]) position. The head activation is gelu
        // regardless of the encoder's configured activation.
        let cls = hidden_states.i((.., 0))?;
        let cls = self.dense.forward(&cls)?;
        let cls = HiddenAct::Gelu.forward(&cls)?;
        self.out_proj.forward(&cls)
    }
}

/// ELECTRA encoder plus a classification head over the `[CLS]` position.
pub struct ElectraForSequenceClassification {
    electra: ElectraModel,
    classifier: ElectraClassificationHead,
}

impl ElectraForSequenceClassification {
    pub fn load(vb: VarBuilder, cfg: &ElectraConfig, num_labels: usize) -> Result<Self> {
        Ok(Self {
            electra: ElectraModel::load(vb.pp("electra"), cfg)?,
            classifier: ElectraClassificationHead::load(cfg, num_labels, vb.pp("classifier"))?,
        })
    }

    /// Returns unnormalized logits of shape `(batch, num_labels)`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let hidden_states = self.electra.forward(input_ids, attention_mask)?;
        self.classifier.forward(&hidden_states)
    }
}

// 1 → attend (bias 0), 0 → masked (large negative added to the scores before
// softmax). Shape (batch, 1, 1, seq_len) for broadcasting over heads.
fn extended_attention_mask(attention_mask: &Tensor, dtype: DType) -> Result<Tensor> {
    let mask = attention_mask.unsqueeze(1)?.unsqueeze(2)?.to_dtype(dtype)?;
    (mask.ones_like()? - &mask)? * -1e9f64
}
