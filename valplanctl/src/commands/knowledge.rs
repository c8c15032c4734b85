use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use valplan_core::{ChunkHit, IngestReport, Judgment, RequirementMetadata};

use crate::DisplayFallback;

#[derive(Args, Debug)]
pub struct JudgeArgs {
    /// Requirement or question the response answers
    #[arg(long)]
    pub query: String,
    /// Document context the response should be grounded in
    #[arg(long)]
    pub context: String,
    /// Agent output to judge
    #[arg(long)]
    pub response: String,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Documents directory (defaults to paths.docs_dir)
    #[arg(long)]
    pub docs: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RetrieveArgs {
    pub query: String,
    /// Number of chunks (defaults to planner.rag_top_k)
    #[arg(long)]
    pub top_k: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Free-form requirement text
    pub description: String,
}

impl DisplayFallback for Judgment {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("Verdict: {} ({}%)", self.verdict, self.confidence),
            format!("Explanation: {}", self.explanation),
        ];
        lines.extend(self.citations.iter().map(|quote| format!("  > {quote}")));
        lines.join("\n")
    }
}

impl DisplayFallback for IngestReport {
    fn display(&self) -> String {
        format!(
            "Scanned {} files: {} indexed ({} chunks), {} unchanged, {} skipped, {} removed",
            self.files_scanned,
            self.documents_indexed,
            self.chunks_written,
            self.documents_unchanged,
            self.documents_skipped,
            self.documents_removed
        )
    }
}

#[derive(Debug, Serialize)]
pub struct RetrieveView {
    pub query: String,
    pub hits: Vec<ChunkHit>,
}

impl DisplayFallback for RetrieveView {
    fn display(&self) -> String {
        if self.hits.is_empty() {
            return format!("No chunks found for {:?}", self.query);
        }
        self.hits
            .iter()
            .map(|hit| {
                format!(
                    "[{path}#{ordinal} d={distance:.4}] {text}",
                    path = hit.document_path,
                    ordinal = hit.ordinal,
                    distance = hit.distance,
                    text = hit.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for RequirementMetadata {
    fn display(&self) -> String {
        let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        format!(
            "domain: {}\ninterface: {}\nfeature: {}",
            field(&self.domain),
            field(&self.interface),
            field(&self.feature)
        )
    }
}
