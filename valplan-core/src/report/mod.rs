use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::ReporterSection;
use crate::executor::{ExecutionRecord, ExecutionRun, Outcome};
use crate::llm::{Embedder, LlmError};

pub mod chart;
pub mod search;

pub use chart::{bar_layout, render_chart};
pub use search::{semantic_search, SearchMatch};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("chart encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("model error: {0}")]
    Llm(#[from] LlmError),
    #[error("embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingMismatch { expected: usize, actual: usize },
    #[error("semantic search requires an embedder")]
    MissingEmbedder,
}

pub type ReportResult<T> = std::result::Result<T, ReportError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pass_rate: f64,
    pub fail_rate: f64,
    pub skip_rate: f64,
}

impl Summary {
    pub fn from_counts(passed: usize, failed: usize, skipped: usize) -> Self {
        let total = passed + failed + skipped;
        let rate = |count: usize| {
            if total > 0 {
                count as f64 / total as f64 * 100.0
            } else {
                0.0
            }
        };
        Self {
            total,
            passed,
            failed,
            skipped,
            pass_rate: rate(passed),
            fail_rate: rate(failed),
            skip_rate: rate(skipped),
        }
    }

    pub fn from_records(records: &[ExecutionRecord]) -> Self {
        let count = |outcome: Outcome| records.iter().filter(|r| r.result == outcome).count();
        Self::from_counts(
            count(Outcome::Pass),
            count(Outcome::Fail),
            count(Outcome::Skipped),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DomainRow {
    pub domain: String,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl DomainRow {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

/// Per-domain outcome counts, sorted by domain, every outcome zero filled.
pub fn domain_breakdown(records: &[ExecutionRecord]) -> Vec<DomainRow> {
    let mut by_domain: BTreeMap<&str, DomainRow> = BTreeMap::new();
    for record in records {
        let row = by_domain
            .entry(record.domain.as_str())
            .or_insert_with(|| DomainRow {
                domain: record.domain.clone(),
                ..DomainRow::default()
            });
        match record.result {
            Outcome::Pass => row.passed += 1,
            Outcome::Fail => row.failed += 1,
            Outcome::Skipped => row.skipped += 1,
        }
    }
    by_domain.into_values().collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub run_id: Uuid,
    pub summary: Summary,
    pub domains: Vec<DomainRow>,
    pub records: Vec<ExecutionRecord>,
    pub chart_base64: String,
}

impl Report {
    pub fn chart_png(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.chart_base64)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportArtifacts {
    pub summary_path: PathBuf,
    pub chart_path: PathBuf,
}

pub struct Reporter {
    config: ReporterSection,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Reporter {
    pub fn new(config: ReporterSection) -> Self {
        Self {
            config,
            embedder: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn report(&self, run: &ExecutionRun) -> ReportResult<Report> {
        let summary = Summary::from_records(&run.records);
        let domains = domain_breakdown(&run.records);
        let png = render_chart(&summary, self.config.chart_width, self.config.chart_height)?;
        info!(
            target: "reporter",
            run_id = %run.run_id,
            total = summary.total,
            pass_rate = summary.pass_rate,
            domains = domains.len(),
            "report generated"
        );
        Ok(Report {
            run_id: run.run_id,
            summary,
            domains,
            records: run.records.clone(),
            chart_base64: STANDARD.encode(png),
        })
    }

    pub async fn search(
        &self,
        records: &[ExecutionRecord],
        query: &str,
    ) -> ReportResult<Vec<SearchMatch>> {
        let embedder = self.embedder.as_ref().ok_or(ReportError::MissingEmbedder)?;
        semantic_search(embedder.as_ref(), records, query, self.config.search_k).await
    }

    /// Writes `summary.json` and `summary.png` under `dir`.
    pub fn write_artifacts<P: AsRef<Path>>(
        &self,
        report: &Report,
        dir: P,
    ) -> ReportResult<ReportArtifacts> {
        let dir = dir.as_ref();
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ReportError::Io { path, source }
        };
        fs::create_dir_all(dir).map_err(io_err(dir))?;

        let summary_path = dir.join("summary.json");
        let payload = serde_json::json!({
            "run_id": report.run_id,
            "summary": report.summary,
            "domains": report.domains,
        });
        fs::write(&summary_path, serde_json::to_string_pretty(&payload)?)
            .map_err(io_err(&summary_path))?;

        let chart_path = dir.join("summary.png");
        let png = render_chart(
            &report.summary,
            self.config.chart_width,
            self.config.chart_height,
        )?;
        fs::write(&chart_path, png).map_err(io_err(&chart_path))?;

        Ok(ReportArtifacts {
            summary_path,
            chart_path,
        })
    }
}
