//! Catalog of sentence-embedding models
//!
//! General-purpose models (MiniLM, MPNet) are a good default for company
//! names; the biomedical models know drug and pharma vocabulary better but
//! are larger and not trained for sentence similarity.

use serde::Serialize;

use crate::error::EmbedderError;

/// Catalog key used when none is given
pub const DEFAULT_MODEL: &str = "minilm";

/// Transformer family, which decides how weights are loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Bert,
    MpNet,
    Roberta,
}

/// One entry of the catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub key: &'static str,
    /// HuggingFace Hub repository
    pub model_name: &'static str,
    pub display_name: &'static str,
    pub dimension: usize,
    pub size_mb: u32,
    pub domain: &'static str,
    pub description: &'static str,
    pub architecture: Architecture,
}

static MODEL_CATALOG: &[ModelConfig] = &[
    ModelConfig {
        key: "minilm",
        model_name: "sentence-transformers/all-MiniLM-L6-v2",
        display_name: "MiniLM-L6-v2",
        dimension: 384,
        size_mb: 80,
        domain: "general",
        description: "Fast, lightweight general-purpose model",
        architecture: Architecture::Bert,
    },
    ModelConfig {
        key: "mpnet",
        model_name: "sentence-transformers/all-mpnet-base-v2",
        display_name: "MPNet-base-v2",
        dimension: 768,
        size_mb: 420,
        domain: "general",
        description: "Higher quality general-purpose model",
        architecture: Architecture::MpNet,
    },
    ModelConfig {
        key: "biobert",
        model_name: "dmis-lab/biobert-base-cased-v1.2",
        display_name: "BioBERT",
        dimension: 768,
        size_mb: 420,
        domain: "biomedical",
        description: "BERT pre-trained on PubMed abstracts and PMC articles",
        architecture: Architecture::Bert,
    },
    ModelConfig {
        key: "multi-qa",
        model_name: "sentence-transformers/multi-qa-mpnet-base-dot-v1",
        display_name: "Multi-QA MPNet",
        dimension: 768,
        size_mb: 420,
        domain: "general",
        description: "Trained on question-answer pairs, strong on semantic search",
        architecture: Architecture::MpNet,
    },
    ModelConfig {
        key: "pubmedbert",
        model_name: "microsoft/BiomedNLP-PubMedBERT-base-uncased-abstract",
        display_name: "PubMedBERT",
        dimension: 768,
        size_mb: 420,
        domain: "biomedical",
        description: "BERT trained from scratch on PubMed abstracts",
        architecture: Architecture::Bert,
    },
    ModelConfig {
        key: "stsb-roberta",
        model_name: "sentence-transformers/stsb-roberta-large",
        display_name: "STSB-RoBERTa-large",
        dimension: 1024,
        size_mb: 1300,
        domain: "general",
        description: "Large model fine-tuned for semantic textual similarity",
        architecture: Architecture::Roberta,
    },
    ModelConfig {
        key: "paraphrase-mpnet",
        model_name: "sentence-transformers/paraphrase-mpnet-base-v2",
        display_name: "Paraphrase MPNet",
        dimension: 768,
        size_mb: 420,
        domain: "general",
        description: "Tuned for paraphrase detection, good for name variants",
        architecture: Architecture::MpNet,
    },
];

/// Every catalog entry, in a stable order
pub fn model_catalog() -> &'static [ModelConfig] {
    MODEL_CATALOG
}

/// Look up a model by catalog key
pub fn get_model_config(key: &str) -> Result<&'static ModelConfig, EmbedderError> {
    MODEL_CATALOG
        .iter()
        .find(|m| m.key == key)
        .ok_or_else(|| EmbedderError::UnknownModel {
            key: key.to_string(),
            available: MODEL_CATALOG
                .iter()
                .map(|m| m.key)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_exists() {
        let config = get_model_config(DEFAULT_MODEL).unwrap();
        assert_eq!(config.dimension, 384);
        assert_eq!(config.architecture, Architecture::Bert);
    }

    #[test]
    fn test_catalog_keys_are_unique() {
        let mut keys: Vec<&str> = model_catalog().iter().map(|m| m.key).collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(total, 7);
    }

    #[test]
    fn test_unknown_model_lists_available() {
        let err = get_model_config("gpt").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("gpt"));
        assert!(message.contains("minilm"));
        assert!(message.contains("paraphrase-mpnet"));
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(get_model_config("stsb-roberta").unwrap().dimension, 1024);
        assert_eq!(get_model_config("pubmedbert").unwrap().domain, "biomedical");
    }
}
