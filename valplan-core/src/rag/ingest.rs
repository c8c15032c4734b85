use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::llm::Embedder;

use super::chunker::Chunker;
use super::store::SqliteRagIndex;
use super::{RagError, RagResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub files_scanned: usize,
    pub documents_indexed: usize,
    pub documents_unchanged: usize,
    pub documents_skipped: usize,
    pub documents_removed: usize,
    pub chunks_written: usize,
}

/// Walks `docs_dir`, embedding every new or changed document into `index`
/// and dropping indexed documents that no longer exist on disk.
pub struct Ingestor<'a> {
    index: &'a SqliteRagIndex,
    embedder: &'a dyn Embedder,
    chunker: Chunker,
    extensions: Vec<String>,
}

impl<'a> Ingestor<'a> {
    pub fn new(index: &'a SqliteRagIndex, embedder: &'a dyn Embedder, chunker: Chunker) -> Self {
        Self {
            index,
            embedder,
            chunker,
            extensions: vec!["md".into(), "txt".into()],
        }
    }

    pub fn with_extensions(mut self, extensions: &[String]) -> Self {
        self.extensions = extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }

    pub async fn ingest_directory<P: AsRef<Path>>(&self, docs_dir: P) -> RagResult<IngestReport> {
        let dir = docs_dir.as_ref();
        if !dir.is_dir() {
            return Err(RagError::MissingDocuments(dir.to_path_buf()));
        }
        self.index.initialize()?;
        if let Some(stored) = self.index.embedding_model()? {
            if stored != self.embedder.model() {
                return Err(RagError::ModelMismatch {
                    expected: stored,
                    actual: self.embedder.model().to_string(),
                });
            }
        }

        let mut report = IngestReport::default();
        let mut seen = BTreeSet::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| dir.to_path_buf());
                RagError::Walk { path, source: err }
            })?;
            if !entry.file_type().is_file() || !self.accepts(entry.path()) {
                continue;
            }
            report.files_scanned += 1;

            let path = entry.path();
            let key = path
                .strip_prefix(dir)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            seen.insert(key.clone());
            let content = match fs::read(path).map(String::from_utf8) {
                Ok(Ok(text)) => text,
                Ok(Err(_)) => {
                    warn!(target: "rag", path = %path.display(), "skipping non utf-8 document");
                    report.documents_skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(target: "rag", path = %path.display(), "skipping unreadable document: {err}");
                    report.documents_skipped += 1;
                    continue;
                }
            };

            let hash = hex::encode(Sha256::digest(content.as_bytes()));
            if self.index.document_hash(&key)?.as_deref() == Some(hash.as_str()) {
                debug!(target: "rag", document = %key, "unchanged, skipping");
                report.documents_unchanged += 1;
                continue;
            }

            let chunks = self.chunker.split(&content);
            let vectors = if chunks.is_empty() {
                Vec::new()
            } else {
                self.embedder.embed(&chunks).await?
            };
            if vectors.len() != chunks.len() {
                return Err(RagError::EmbeddingMismatch {
                    expected: chunks.len(),
                    actual: vectors.len(),
                });
            }
            let pairs: Vec<(String, Vec<f32>)> = chunks.into_iter().zip(vectors).collect();
            self.index
                .upsert_document(&key, &hash, self.embedder.model(), &pairs)?;
            info!(target: "rag", document = %key, chunks = pairs.len(), "document indexed");
            report.documents_indexed += 1;
            report.chunks_written += pairs.len();
        }

        report.documents_removed = self.index.prune_documents(&seen)?;
        if report.documents_removed > 0 {
            info!(target: "rag", removed = report.documents_removed, "stale documents removed");
        }

        info!(
            target: "rag",
            scanned = report.files_scanned,
            indexed = report.documents_indexed,
            unchanged = report.documents_unchanged,
            "ingestion complete"
        );
        Ok(report)
    }
}
