//! Model architectures implemented in-crate.
//!
//! candle-transformers carries no ELECTRA implementation, so the discriminator
//! encoder and its sequence-classification head live here, following the
//! Hugging Face module layout so checkpoint tensor names line up.

pub mod electra;

pub use electra::{ElectraConfig, ElectraForSequenceClassification, ElectraModel};
