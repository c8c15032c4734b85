use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::llm::l2_distance;
use crate::sqlite::configure_connection;

use super::{RagError, RagResult};

const RAG_SCHEMA: &str = include_str!("../../../sql/rag_index.sql");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkHit {
    pub document_path: String,
    pub ordinal: usize,
    pub text: String,
    pub distance: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedding_model: Option<String>,
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SqliteRagIndexBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteRagIndexBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteRagIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> RagResult<SqliteRagIndex> {
        let path = self.path.ok_or(RagError::MissingIndex)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };

        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        Ok(SqliteRagIndex { path, flags })
    }
}

/// Chunk embeddings persisted in SQLite, searched with a flat L2 scan.
#[derive(Debug, Clone)]
pub struct SqliteRagIndex {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteRagIndex {
    pub fn builder() -> SqliteRagIndexBuilder {
        SqliteRagIndexBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> RagResult<Self> {
        SqliteRagIndexBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> RagResult<Connection> {
        if self.flags.contains(OpenFlags::SQLITE_OPEN_CREATE) {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| RagError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            RagError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| RagError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> RagResult<()> {
        let conn = self.open()?;
        conn.execute_batch(RAG_SCHEMA)?;
        Ok(())
    }

    pub fn document_hash(&self, path: &str) -> RagResult<Option<String>> {
        let conn = self.open()?;
        let hash = conn
            .query_row(
                "SELECT sha256 FROM documents WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn embedding_model(&self) -> RagResult<Option<String>> {
        let conn = self.open()?;
        meta_value(&conn, "embedding_model")
    }

    /// Replaces every chunk of `path` in one transaction. The first document
    /// written pins the embedding model and dimension of the index.
    pub fn upsert_document(
        &self,
        path: &str,
        sha256: &str,
        model: &str,
        chunks: &[(String, Vec<f32>)],
    ) -> RagResult<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        if let Some(stored) = meta_value(&tx, "embedding_model")? {
            if stored != model {
                return Err(RagError::ModelMismatch {
                    expected: stored,
                    actual: model.to_string(),
                });
            }
        }
        let stored_dim = meta_value(&tx, "dimension")?
            .and_then(|value| value.parse::<usize>().ok());
        let incoming_dim = chunks.first().map(|(_, vector)| vector.len());
        if let Some(actual) = chunks.iter().map(|(_, v)| v.len()).find(|len| Some(*len) != incoming_dim) {
            return Err(RagError::DimensionMismatch {
                expected: incoming_dim.unwrap_or(0),
                actual,
            });
        }
        if let (Some(expected), Some(actual)) = (stored_dim, incoming_dim) {
            if expected != actual {
                return Err(RagError::DimensionMismatch { expected, actual });
            }
        }
        if let Some(dim) = incoming_dim {
            tx.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('dimension', ?1)",
                params![dim.to_string()],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding_model', ?1)",
                params![model],
            )?;
        }

        tx.execute("DELETE FROM chunks WHERE document_path = ?1", params![path])?;
        tx.execute(
            "INSERT OR REPLACE INTO documents (path, sha256, chunk_count, ingested_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![path, sha256, chunks.len() as i64, Utc::now()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (document_path, ordinal, text, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (ordinal, (text, vector)) in chunks.iter().enumerate() {
                stmt.execute(params![path, ordinal as i64, text, encode_vector(vector)])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn search(&self, query: &[f32], top_k: usize) -> RagResult<Vec<ChunkHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let conn = self.open()?;
        if let Some(expected) = meta_value(&conn, "dimension")?.and_then(|v| v.parse::<usize>().ok()) {
            if expected != query.len() {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let mut stmt =
            conn.prepare("SELECT document_path, ordinal, text, embedding FROM chunks ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (document_path, ordinal, text, blob) = row?;
            let vector = decode_vector(&blob)?;
            let distance = l2_distance(query, &vector);
            hits.push(ChunkHit {
                document_path,
                ordinal: ordinal.max(0) as usize,
                text,
                distance: if distance.is_nan() { f32::INFINITY } else { distance },
            });
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Deletes every document whose path is not in `keep`; chunks cascade.
    /// Once the index is empty its pinned model and dimension are released.
    pub fn prune_documents(&self, keep: &BTreeSet<String>) -> RagResult<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let stale: Vec<String> = {
            let mut stmt = tx.prepare("SELECT path FROM documents ORDER BY path")?;
            let paths = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut stale = Vec::new();
            for path in paths {
                let path = path?;
                if !keep.contains(&path) {
                    stale.push(path);
                }
            }
            stale
        };
        for path in &stale {
            tx.execute("DELETE FROM documents WHERE path = ?1", params![path])?;
        }
        let remaining: i64 = tx.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        if remaining == 0 {
            tx.execute("DELETE FROM meta WHERE key IN ('dimension', 'embedding_model')", [])?;
        }
        tx.commit()?;
        Ok(stale.len())
    }

    pub fn stats(&self) -> RagResult<IndexStats> {
        let conn = self.open()?;
        let documents: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        let chunks: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(IndexStats {
            documents: documents as usize,
            chunks: chunks as usize,
            embedding_model: meta_value(&conn, "embedding_model")?,
            dimension: meta_value(&conn, "dimension")?.and_then(|v| v.parse().ok()),
        })
    }
}

fn meta_value(conn: &Connection, key: &str) -> RagResult<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?)
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> RagResult<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(RagError::CorruptEmbedding(blob.len()));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect())
}
