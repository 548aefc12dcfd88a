//! # koelectra-sentiment
//!
//! Korean movie-review sentiment analysis powered by [Candle](https://github.com/huggingface/candle).
//!
//! A [`SentimentService`] owns one tokenizer/classifier pair loaded from a
//! KoELECTRA checkpoint directory — preferring a fine-tuned checkpoint over
//! the base one — and exposes single and batch prediction, model
//! introspection, and a self-exercising health check. Loading is lazy and
//! retried on demand; a broken checkpoint degrades the service, it never
//! brings the process down.
//!
//! ```rust,no_run
//! use koelectra_sentiment::{SentimentService, ServiceConfig};
//!
//! # fn main() -> koelectra_sentiment::Result<()> {
//! let service = SentimentService::new(ServiceConfig::default())?;
//!
//! let prediction = service.predict("이 영화는 정말 재미있어요!")?;
//! println!("{} ({:.2})", prediction.sentiment, prediction.confidence);
//!
//! let batch = service.predict_batch(&["연기가 훌륭했어요", "정말 지루한 영화"])?;
//! println!("{}/{} succeeded", batch.success_count, batch.total_count);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub(crate) mod loaders;
pub mod models;
mod pipeline;
mod preprocess;
mod service;

pub use config::ServiceConfig;
pub use device::DeviceRequest;
pub use error::{Result, SentimentError};
pub use loaders::ModelVariant;
pub use pipeline::{BatchOutput, BatchResult, ModelProvenance, Prediction};
pub use preprocess::normalize;
pub use service::{
    HealthReport, HealthStatus, ModelInfo, SentimentService, SentimentServiceBuilder,
};
