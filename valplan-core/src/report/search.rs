use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::executor::{ExecutionRecord, Outcome};
use crate::llm::{l2_distance, Embedder};

use super::{ReportError, ReportResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchMatch {
    pub id: String,
    pub title: String,
    pub domain: String,
    pub result: Outcome,
    pub distance: f32,
}

/// Finds the `k` executed tests whose titles are nearest to the query in
/// embedding space (flat L2 scan).
pub async fn semantic_search(
    embedder: &dyn Embedder,
    records: &[ExecutionRecord],
    query: &str,
    k: usize,
) -> ReportResult<Vec<SearchMatch>> {
    if records.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let titles: Vec<String> = records.iter().map(|record| record.title.clone()).collect();
    let vectors = embedder.embed(&titles).await?;
    if vectors.len() != records.len() {
        return Err(ReportError::EmbeddingMismatch {
            expected: records.len(),
            actual: vectors.len(),
        });
    }
    let query_vec = embedder.embed_one(query).await?;

    let mut scored: Vec<(usize, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(idx, vector)| {
            let distance = l2_distance(&query_vec, vector);
            (idx, if distance.is_nan() { f32::INFINITY } else { distance })
        })
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    scored.truncate(k);
    debug!(target: "reporter", query, hits = scored.len(), "semantic search");

    Ok(scored
        .into_iter()
        .map(|(idx, distance)| {
            let record = &records[idx];
            SearchMatch {
                id: record.id.clone(),
                title: record.title.clone(),
                domain: record.domain.clone(),
                result: record.result,
                distance,
            }
        })
        .collect())
}
