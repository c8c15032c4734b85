use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;
use crate::rag::RagError;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("model error: {0}")]
    Llm(#[from] LlmError),
    #[error("rag error: {0}")]
    Rag(#[from] RagError),
    #[error("embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingMismatch { expected: usize, actual: usize },
    #[error("llm selection requested but no {0} configured")]
    MissingComponent(&'static str),
}

pub type PlanResult<T> = std::result::Result<T, PlanError>;
