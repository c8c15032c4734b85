//! Document index used to ground planning: chunking, ingestion and
//! nearest-neighbour retrieval over SQLite-persisted embeddings.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::llm::{Embedder, LlmError};

pub mod chunker;
pub mod ingest;
pub mod store;

pub use chunker::Chunker;
pub use ingest::{IngestReport, Ingestor};
pub use store::{ChunkHit, IndexStats, SqliteRagIndex, SqliteRagIndexBuilder};

#[derive(Debug, Error)]
pub enum RagError {
    #[error("no index path configured")]
    MissingIndex,
    #[error("documents directory {0} not found")]
    MissingDocuments(PathBuf),
    #[error("failed to open index {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("index was built with embedding model {expected}, got {actual}")]
    ModelMismatch { expected: String, actual: String },
    #[error("embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingMismatch { expected: usize, actual: usize },
    #[error("stored embedding blob has invalid length {0}")]
    CorruptEmbedding(usize),
    #[error("model error: {0}")]
    Llm(#[from] LlmError),
}

pub type RagResult<T> = std::result::Result<T, RagError>;

pub struct RagRetriever {
    index: SqliteRagIndex,
    embedder: Arc<dyn Embedder>,
}

impl RagRetriever {
    pub fn new(index: SqliteRagIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    /// Opens a read-only retriever, or `None` when nothing has been ingested
    /// at `path` yet.
    pub fn open_if_exists(
        path: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
    ) -> RagResult<Option<Self>> {
        let path = path.into();
        if !path.is_file() {
            debug!(target: "rag", path = %path.display(), "rag index not built yet");
            return Ok(None);
        }
        let index = SqliteRagIndex::builder()
            .path(path)
            .read_only(true)
            .build()?;
        Ok(Some(Self::new(index, embedder)))
    }

    pub fn index(&self) -> &SqliteRagIndex {
        &self.index
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> RagResult<Vec<ChunkHit>> {
        let vector = self.embedder.embed_one(query).await?;
        let hits = self.index.search(&vector, top_k)?;
        debug!(target: "rag", query, hits = hits.len(), "retrieved chunks");
        Ok(hits)
    }

    pub async fn context(&self, query: &str, top_k: usize) -> RagResult<String> {
        let hits = self.retrieve(query, top_k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| hit.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
