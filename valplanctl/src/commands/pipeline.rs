use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use valplan_core::report::ReportArtifacts;
use valplan_core::{
    DomainRow, ExecutionRecord, ExecutionRun, PlanOutcome, PlanSummary, Report, SearchMatch, ValidationPlan,
};

use crate::DisplayFallback;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Use embedding ranking and the chat model instead of tag matching
    #[arg(long)]
    pub llm: bool,
}

#[derive(Args, Debug)]
pub struct ExecuteArgs {
    /// Seed for reproducible outcomes
    #[arg(long)]
    pub seed: Option<u64>,
    /// Write the execution run as JSON to this file
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Execution run JSON written by `execute --save`; the plan is executed
    /// afresh when omitted
    #[arg(long)]
    pub run: Option<PathBuf>,
    /// Seed used when the plan is executed afresh
    #[arg(long)]
    pub seed: Option<u64>,
    /// Semantic search over executed test titles
    #[arg(long)]
    pub query: Option<String>,
    /// Directory receiving summary.json and summary.png
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(long)]
    pub llm: bool,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub query: Option<String>,
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CiteArgs {
    /// JSON list of {requirement_text, context, llm_response}
    #[arg(long)]
    pub requests: PathBuf,
    #[arg(long)]
    pub llm: bool,
}

#[derive(Debug, Serialize)]
pub struct PlanView {
    pub plan_path: PathBuf,
    pub summary: PlanSummary,
    pub plan: ValidationPlan,
}

impl PlanView {
    pub fn new(plan_path: PathBuf, outcome: PlanOutcome) -> Self {
        Self {
            plan_path,
            summary: outcome.summary,
            plan: outcome.plan,
        }
    }
}

impl DisplayFallback for PlanView {
    fn display(&self) -> String {
        let mut lines = vec![
            format!(
                "Plan ({mode}) written to {path}",
                mode = self.summary.mode,
                path = self.plan_path.display()
            ),
            format!(
                "Requirements: {} | Catalog: {} | Selected: {}",
                self.summary.requirements, self.summary.catalog_size, self.summary.selected
            ),
        ];
        for test in &self.plan.test_catalog {
            lines.push(format!(
                "  {id}  {title} [{domain}, {category}]",
                id = test.id,
                title = test.title,
                domain = test.domain,
                category = test.validation_category
            ));
        }
        if let Some(citations) = &self.plan.citations {
            let grounded = citations.iter().filter(|c| c.is_grounded()).count();
            lines.push(format!(
                "Citations: {} ({grounded} grounded)",
                citations.len()
            ));
            for judgment in citations {
                lines.push(format!(
                    "  {verdict} ({confidence}%): {explanation}",
                    verdict = judgment.verdict,
                    confidence = judgment.confidence,
                    explanation = judgment.explanation
                ));
            }
        }
        lines.join("\n")
    }
}

impl DisplayFallback for ExecutionRun {
    fn display(&self) -> String {
        let mut lines = vec![format!("Run {} ({} tests)", self.run_id, self.records.len())];
        lines.extend(self.records.iter().map(record_line));
        lines.join("\n")
    }
}

fn record_line(record: &ExecutionRecord) -> String {
    format!(
        "  {result:<7} {id}  {title} [{domain}]",
        result = record.result.as_str(),
        id = record.id,
        title = record.title,
        domain = record.domain
    )
}

#[derive(Debug, Serialize)]
pub struct ReportView {
    pub report: Report,
    pub matches: Vec<SearchMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ReportArtifacts>,
}

impl DisplayFallback for ReportView {
    fn display(&self) -> String {
        let summary = &self.report.summary;
        let mut lines = vec![
            format!("Run {}", self.report.run_id),
            format!(
                "Total: {} | Passed: {} ({:.1}%) | Failed: {} ({:.1}%) | Skipped: {} ({:.1}%)",
                summary.total,
                summary.passed,
                summary.pass_rate,
                summary.failed,
                summary.fail_rate,
                summary.skipped,
                summary.skip_rate
            ),
        ];
        if !self.report.domains.is_empty() {
            lines.push("Domains:".to_string());
            lines.extend(self.report.domains.iter().map(domain_line));
        }
        if !self.matches.is_empty() {
            lines.push("Matches:".to_string());
            for hit in &self.matches {
                lines.push(format!(
                    "  {id}  {title} [{result}] d={distance:.4}",
                    id = hit.id,
                    title = hit.title,
                    result = hit.result,
                    distance = hit.distance
                ));
            }
        }
        match &self.artifacts {
            Some(artifacts) => lines.push(format!(
                "Artifacts: {} {}",
                artifacts.summary_path.display(),
                artifacts.chart_path.display()
            )),
            None => lines.push(format!(
                "Chart: {} bytes of base64 PNG (use --out to write it)",
                self.report.chart_base64.len()
            )),
        }
        lines.join("\n")
    }
}

fn domain_line(row: &DomainRow) -> String {
    format!(
        "  {domain:<24} pass {passed:>3}  fail {failed:>3}  skip {skipped:>3}  total {total:>3}",
        domain = row.domain,
        total = row.total(),
        passed = row.passed,
        failed = row.failed,
        skipped = row.skipped
    )
}

#[derive(Debug, Serialize)]
pub struct RunView {
    pub plan: PlanView,
    pub report: ReportView,
}

impl DisplayFallback for RunView {
    fn display(&self) -> String {
        format!("{}\n\n{}", self.plan.display(), self.report.display())
    }
}
