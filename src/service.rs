//! The sentiment inference service: model lifecycle and public operations.
//!
//! One [`SentimentService`] owns at most one resident
//! tokenizer/classifier pair at a time. Construct it explicitly and share it
//! by reference; there is no global instance.

use crate::config::ServiceConfig;
use crate::device::{device_label, DeviceRequest};
use crate::error::{Result, SentimentError};
use crate::loaders::{self, ModelVariant};
use crate::pipeline::{BatchOutput, BatchResult, Prediction, SentimentPipeline};
use crate::preprocess::normalize;
use candle_core::Device;
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Model lifecycle. Transitions: `Unloaded`/`Failed` → `Loading` on demand,
/// `Loading` → `Loaded` on success or `Failed` on error. `Loading` is only
/// ever observed by the thread holding the state lock; it exists to keep the
/// transitions explicit.
enum ModelState {
    Unloaded,
    Loading,
    Loaded(Arc<SentimentPipeline>),
    Failed(String),
}

/// Overall service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Error,
}

/// Result of [`SentimentService::health_check`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub model_loaded: bool,
    pub tokenizer_loaded: bool,
    pub device: String,
    /// The probe prediction, when the check succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_prediction: Option<Prediction>,
    /// Failure reason, when it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metadata about the model the service is (or would be) serving.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub model_path: String,
    pub variant: ModelVariant,
    pub device: String,
    pub max_length: usize,
    pub labels: Vec<String>,
    pub loaded: bool,
}

/// Builder for [`SentimentService`] instances.
pub struct SentimentServiceBuilder {
    config: ServiceConfig,
    device_request: DeviceRequest,
}

impl SentimentServiceBuilder {
    /// Use CPU for inference.
    pub fn cpu(mut self) -> Self {
        self.device_request = DeviceRequest::Cpu;
        self
    }

    /// Use a specific CUDA GPU for inference.
    pub fn cuda(mut self, index: usize) -> Self {
        self.device_request = DeviceRequest::Cuda(index);
        self
    }

    /// Build the service. With `config.preload` set the model is loaded now;
    /// a preload failure is logged and retried on first use rather than
    /// failing construction.
    pub fn build(self) -> Result<SentimentService> {
        let device = self.device_request.resolve()?;
        tracing::info!(device = device_label(&device), "sentiment service initialized");
        let service = SentimentService {
            config: self.config,
            device,
            state: RwLock::new(ModelState::Unloaded),
        };
        if service.config.preload {
            if let Err(e) = service.acquire() {
                tracing::warn!(error = %e, "model preload failed, will retry on first call");
            }
        }
        Ok(service)
    }
}

/// Korean binary sentiment analysis over a KoELECTRA checkpoint.
///
/// The model is loaded lazily on the first prediction (or eagerly with
/// `config.preload`) and kept for the lifetime of the service; [`reload`]
/// swaps it atomically after an external fine-tuning run completes.
///
/// [`reload`]: SentimentService::reload
pub struct SentimentService {
    config: ServiceConfig,
    device: Device,
    state: RwLock<ModelState>,
}

impl SentimentService {
    /// Start building a service. The device defaults to CUDA when available.
    pub fn builder(config: ServiceConfig) -> SentimentServiceBuilder {
        SentimentServiceBuilder {
            config,
            device_request: DeviceRequest::default(),
        }
    }

    /// Build with the default device selection.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Return the resident pipeline, loading it first if necessary.
    ///
    /// Loading is re-attempted on every call while no model is resident, with
    /// no backoff; a load failure is never fatal to the process.
    fn acquire(&self) -> Result<Arc<SentimentPipeline>> {
        if let ModelState::Loaded(pipeline) = &*self.state.read().unwrap() {
            return Ok(pipeline.clone());
        }

        let mut state = self.state.write().unwrap();
        // Another caller may have finished loading while we waited.
        if let ModelState::Loaded(pipeline) = &*state {
            return Ok(pipeline.clone());
        }
        if let ModelState::Failed(reason) = &*state {
            tracing::debug!(previous_error = %reason, "retrying model load");
        }

        *state = ModelState::Loading;
        match SentimentPipeline::load(&self.config, &self.device) {
            Ok(pipeline) => {
                let pipeline = Arc::new(pipeline);
                *state = ModelState::Loaded(pipeline.clone());
                Ok(pipeline)
            }
            Err(e) => {
                let reason = e.to_string();
                *state = ModelState::Failed(reason.clone());
                Err(SentimentError::ModelUnavailable(reason))
            }
        }
    }

    /// Classify one text.
    ///
    /// Rejects input that is empty after whitespace normalization, or longer
    /// than `config.max_text_chars`. Inference failures are returned as-is and
    /// never retried.
    pub fn predict(&self, text: &str) -> Result<Prediction> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Err(SentimentError::EmptyText);
        }
        let len = normalized.chars().count();
        if len > self.config.max_text_chars {
            return Err(SentimentError::TextTooLong {
                len,
                max: self.config.max_text_chars,
            });
        }

        let pipeline = self.acquire()?;
        pipeline.predict(text, &normalized)
    }

    /// Classify up to `config.max_batch_size` texts, sequentially and in
    /// input order, one outcome per input. A per-item failure never aborts
    /// the batch; size-limit violations are rejected before any inference
    /// runs.
    pub fn predict_batch<S: AsRef<str>>(&self, texts: &[S]) -> Result<BatchOutput> {
        if texts.is_empty() {
            return Err(SentimentError::EmptyBatch);
        }
        if texts.len() > self.config.max_batch_size {
            return Err(SentimentError::BatchTooLarge {
                len: texts.len(),
                max: self.config.max_batch_size,
            });
        }

        let results: Vec<BatchResult> = texts
            .iter()
            .map(|text| BatchResult {
                text: text.as_ref().to_string(),
                prediction: self.predict(text.as_ref()),
            })
            .collect();

        let error_count = results.iter().filter(|r| r.prediction.is_err()).count();
        Ok(BatchOutput {
            total_count: results.len(),
            success_count: results.len() - error_count,
            error_count,
            results,
        })
    }

    /// Metadata for the currently selected checkpoint.
    pub fn model_info(&self) -> ModelInfo {
        let (model_path, variant, loaded) = match &*self.state.read().unwrap() {
            ModelState::Loaded(pipeline) => {
                (pipeline.source().to_string(), pipeline.variant(), true)
            }
            _ => {
                let (path, variant) = loaders::select_checkpoint(&self.config);
                (path.display().to_string(), variant, false)
            }
        };
        ModelInfo {
            model_name: self.config.model_name.clone(),
            model_path,
            variant,
            device: device_label(&self.device).to_string(),
            max_length: self.config.max_length,
            labels: self.config.labels.to_vec(),
            loaded,
        }
    }

    /// Exercise the full inference path with the configured probe sentence.
    ///
    /// A cold-start health check doubles as the first model load. Always
    /// returns a report, never an error.
    pub fn health_check(&self) -> HealthReport {
        let device = device_label(&self.device).to_string();
        match self.predict(&self.config.probe_text) {
            Ok(prediction) => HealthReport {
                status: HealthStatus::Healthy,
                model_loaded: true,
                tokenizer_loaded: true,
                device,
                test_prediction: Some(prediction),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "health check failed");
                // Tokenizer and model load as a pair.
                let loaded = matches!(&*self.state.read().unwrap(), ModelState::Loaded(_));
                HealthReport {
                    status: HealthStatus::Error,
                    model_loaded: loaded,
                    tokenizer_loaded: loaded,
                    device,
                    test_prediction: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Load a fresh pipeline from the (re-)selected checkpoint and swap it in
    /// atomically. In-flight predictions finish against the pipeline they
    /// captured. On failure the resident model, if any, stays in place.
    pub fn reload(&self) -> Result<ModelInfo> {
        let pipeline = Arc::new(SentimentPipeline::load(&self.config, &self.device)?);
        tracing::info!(
            source = %pipeline.source(),
            variant = %pipeline.variant(),
            "model reloaded"
        );
        *self.state.write().unwrap() = ModelState::Loaded(pipeline);
        Ok(self.model_info())
    }
}
