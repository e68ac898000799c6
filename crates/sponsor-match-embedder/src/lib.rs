//! Candle-backed embedding provider for sponsor-match
//!
//! ```text
//! ModelCatalog key ("minilm")
//!       │
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  hf-hub download (config, tokenizer,    │
//! │  safetensors or pytorch weights)        │
//! └─────────────────────────────────────────┘
//!       │
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  SentenceEmbedder                       │
//! │  "Pfizer Inc." → mean pool → [384 dims] │
//! └─────────────────────────────────────────┘
//!       │
//!       ▼
//!  sponsor_match::EmbeddingProvider
//! ```

pub mod embedder;
pub mod error;
pub mod models;

pub use embedder::SentenceEmbedder;
pub use error::EmbedderError;
pub use models::{get_model_config, model_catalog, Architecture, ModelConfig, DEFAULT_MODEL};
