//! Sentence embedding using Candle and BERT-family sentence-transformers
//!
//! Loads a catalog model from the HuggingFace Hub and computes
//! L2-normalized embeddings, so dot product equals cosine similarity.
//!
//! Sentence-transformers models are trained with **mean pooling** over the
//! attention mask (not CLS pooling), and names are embedded as-is with no
//! instruction prefix: sponsor and ticker names are symmetric inputs.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{api::sync::Api, Repo, RepoType};
use sponsor_match::EmbeddingProvider;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info, instrument};

use crate::error::EmbedderError;
use crate::models::{get_model_config, Architecture, ModelConfig, DEFAULT_MODEL};

/// Texts per forward pass
const BATCH_SIZE: usize = 64;

/// Longest tokenized input; company names with context fit comfortably
const MAX_TOKENS: usize = 256;

/// Sentence embedder for one catalog model
pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    config: &'static ModelConfig,
}

impl SentenceEmbedder {
    /// Load the default catalog model (all-MiniLM-L6-v2)
    ///
    /// The model is cached in the HuggingFace cache directory (~/.cache/huggingface).
    /// First download is ~80MB.
    pub fn new() -> Result<Self> {
        Self::from_key(DEFAULT_MODEL)
    }

    /// Load a model by catalog key, e.g. `"minilm"` or `"biobert"`
    pub fn from_key(key: &str) -> Result<Self> {
        Self::with_model(get_model_config(key)?)
    }

    pub fn with_model(config: &'static ModelConfig) -> Result<Self> {
        if config.architecture != Architecture::Bert {
            return Err(EmbedderError::UnsupportedArchitecture {
                model: config.model_name.to_string(),
                architecture: config.architecture,
            }
            .into());
        }

        info!(
            model = config.model_name,
            size_mb = config.size_mb,
            "Loading embedding model"
        );

        let device = Device::Cpu;

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::new(config.model_name.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .context("Failed to download config.json")?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .context("Failed to download tokenizer.json")?;

        let bert_config: Config = serde_json::from_str(
            &std::fs::read_to_string(&config_path).context("Failed to read config.json")?,
        )
        .context("Failed to parse config.json")?;
        debug!(hidden_size = bert_config.hidden_size, "Model config loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        // Older biomedical checkpoints only ship PyTorch weights
        let vb = match repo.get("model.safetensors") {
            Ok(weights_path) => unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                    .context("Failed to load model weights")?
            },
            Err(_) => {
                let weights_path = repo
                    .get("pytorch_model.bin")
                    .context("Failed to download model weights")?;
                VarBuilder::from_pth(weights_path, DTYPE, &device)
                    .context("Failed to load model weights")?
            }
        };

        let model = BertModel::load(vb, &bert_config).context("Failed to build BERT model")?;

        info!(model = config.display_name, "Embedding model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            config,
        })
    }

    /// Catalog entry this embedder was built from
    pub fn model_config(&self) -> &'static ModelConfig {
        self.config
    }

    pub fn embedding_dim(&self) -> usize {
        self.config.dimension
    }

    /// Embed texts in batches of [`BATCH_SIZE`]
    #[instrument(skip_all, fields(texts = texts.len(), model = self.config.key))]
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            embeddings.extend(self.forward_batch(chunk)?);
        }
        Ok(embeddings)
    }

    fn forward_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut all_input_ids = Vec::with_capacity(texts.len() * max_len);
        let mut all_attention_mask = Vec::with_capacity(texts.len() * max_len);
        let mut all_token_type_ids = Vec::with_capacity(texts.len() * max_len);

        for encoding in &encodings {
            let pad = max_len - encoding.get_ids().len();
            all_input_ids.extend(encoding.get_ids().iter().copied());
            all_input_ids.extend(std::iter::repeat(0u32).take(pad));
            all_attention_mask.extend(encoding.get_attention_mask().iter().copied());
            all_attention_mask.extend(std::iter::repeat(0u32).take(pad));
            all_token_type_ids.extend(encoding.get_type_ids().iter().copied());
            all_token_type_ids.extend(std::iter::repeat(0u32).take(pad));
        }

        let batch_size = texts.len();
        let input_ids = Tensor::from_vec(all_input_ids, (batch_size, max_len), &self.device)?;
        let attention_mask =
            Tensor::from_vec(all_attention_mask, (batch_size, max_len), &self.device)?;
        let token_type_ids =
            Tensor::from_vec(all_token_type_ids, (batch_size, max_len), &self.device)?;

        // output shape: (batch_size, seq_len, hidden_size)
        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = Self::mean_pool(&output, &attention_mask)?;
        let normalized = Self::l2_normalize(&pooled)?;

        Ok(normalized.to_vec2::<f32>()?)
    }

    /// Average token embeddings, ignoring padding
    fn mean_pool(output: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = output.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
        Ok(summed.broadcast_div(&counts)?)
    }

    /// L2 normalize embeddings for cosine similarity
    fn l2_normalize(tensor: &Tensor) -> Result<Tensor> {
        let norm = tensor
            .sqr()?
            .sum_keepdim(1)?
            .sqrt()?
            .clamp(1e-12, f64::MAX)?;
        Ok(tensor.broadcast_div(&norm)?)
    }
}

impl EmbeddingProvider for SentenceEmbedder {
    fn model_name(&self) -> &str {
        self.config.model_name
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_rejects_non_bert_models() {
        let err = SentenceEmbedder::from_key("mpnet").err().unwrap();
        assert!(err.to_string().contains("only BERT-family"));
    }

    #[test]
    fn test_rejects_unknown_key() {
        let err = SentenceEmbedder::from_key("nope").err().unwrap();
        assert!(err.to_string().contains("Available"));
    }

    #[test]
    #[ignore] // Requires model download
    fn test_embed_is_normalized() {
        let embedder = SentenceEmbedder::new().expect("Failed to load embedder");
        let embeddings = embedder
            .embed_batch(&["Pfizer Inc.", "Moderna", "University of Oxford"])
            .expect("Failed to embed");

        assert_eq!(embeddings.len(), 3);
        for emb in &embeddings {
            assert_eq!(emb.len(), embedder.embedding_dim());
            let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 0.01);
        }
    }

    #[test]
    #[ignore] // Requires model download
    fn test_name_variants_are_close() {
        let embedder = SentenceEmbedder::new().expect("Failed to load embedder");
        let e = embedder
            .embed_batch(&["Pfizer", "Pfizer Inc.", "Caterpillar Inc."])
            .unwrap();

        let same = cosine(&e[0], &e[1]);
        let different = cosine(&e[0], &e[2]);
        assert!(same > different, "{same} vs {different}");
    }

    #[test]
    #[ignore] // Requires model download
    fn test_batching_matches_single() {
        let embedder = SentenceEmbedder::new().expect("Failed to load embedder");
        let texts: Vec<String> = (0..BATCH_SIZE + 3).map(|i| format!("Sponsor {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let batched = embedder.embed_batch(&refs).unwrap();
        let single = embedder.embed_batch(&refs[BATCH_SIZE..BATCH_SIZE + 1]).unwrap();
        assert_eq!(batched.len(), refs.len());
        assert!(cosine(&batched[BATCH_SIZE], &single[0]) > 0.999);
    }
}
