use thiserror::Error;

use crate::models::Architecture;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("Unknown model '{key}'. Available: {available}")]
    UnknownModel { key: String, available: String },

    #[error("Model '{model}' uses the {architecture:?} architecture, only BERT-family models can be loaded")]
    UnsupportedArchitecture {
        model: String,
        architecture: Architecture,
    },
}
