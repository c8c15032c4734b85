use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::PlannerSection;
use crate::judge::{CitationJudge, Judgment};
use crate::llm::{Embedder, LlmClient};
use crate::rag::RagRetriever;

use super::catalog::{load_requirements, load_test_cases, load_validation_plan, save_validation_plan};
use super::models::{
    PlanSummary, Requirement, SelectedTestCase, SelectionMode, TestCase, ValidationPlan,
};
use super::selection::{parse_selection, rank_by_similarity, rule_based_selection};
use super::{PlanError, PlanResult};

pub const PLANNER_SYSTEM_PROMPT: &str = "\
You are a validation architect planning agent.
Given a requirement and a list of test cases, identify the most relevant and applicable test cases that would validate the requirement.
Respond in JSON array format with at least 2 test cases with each test case containing fields:
id (e.g., 1111111111 or 2222222222), title, domain (e.g., power_management or connectivity.wifi), validation_category (e.g., CAT2 or CAT3).
These fields must be derived from the list of test cases.";

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub similarity_top_k: usize,
    pub rag_query: String,
    pub rag_top_k: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig::from(&PlannerSection::default())
    }
}

impl From<&PlannerSection> for PlannerConfig {
    fn from(section: &PlannerSection) -> Self {
        Self {
            similarity_top_k: section.similarity_top_k.max(1),
            rag_query: section.rag_query.clone(),
            rag_top_k: section.rag_top_k,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub test_catalog: Vec<SelectedTestCase>,
    pub citations: Option<Vec<Judgment>>,
}

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: ValidationPlan,
    pub summary: PlanSummary,
}

pub struct Planner {
    config: PlannerConfig,
    requirements_path: PathBuf,
    catalog_path: PathBuf,
    embedder: Option<Arc<dyn Embedder>>,
    llm: Option<Arc<LlmClient>>,
    rag: Option<Arc<RagRetriever>>,
    judge: Option<Arc<CitationJudge>>,
}

impl Planner {
    pub fn new(
        config: PlannerConfig,
        requirements_path: impl AsRef<Path>,
        catalog_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            config,
            requirements_path: requirements_path.as_ref().to_path_buf(),
            catalog_path: catalog_path.as_ref().to_path_buf(),
            embedder: None,
            llm: None,
            rag: None,
            judge: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_llm(mut self, llm: Arc<LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_rag(mut self, rag: Arc<RagRetriever>) -> Self {
        self.rag = Some(rag);
        self
    }

    pub fn with_judge(mut self, judge: Arc<CitationJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Loads inputs, selects test cases and writes them back into the plan file.
    pub async fn run(&self, plan_path: impl AsRef<Path>, use_llm: bool) -> PlanResult<PlanOutcome> {
        let plan_path = plan_path.as_ref();
        let requirements = load_requirements(&self.requirements_path)?;
        let test_cases = load_test_cases(&self.catalog_path)?;
        let mut plan = load_validation_plan(plan_path)?;
        let mode = SelectionMode::from_flag(use_llm);

        let selection = self.select(&requirements, &test_cases, mode).await?;
        plan.test_catalog = selection.test_catalog;
        plan.citations = selection.citations;

        let summary = PlanSummary {
            mode,
            requirements: requirements.len(),
            catalog_size: test_cases.len(),
            selected: plan.test_catalog.len(),
            citations: plan.citations.as_ref().map(Vec::len).unwrap_or(0),
        };
        info!(
            target: "planner",
            mode = %summary.mode,
            requirements = summary.requirements,
            selected = summary.selected,
            citations = summary.citations,
            "test catalog selected"
        );

        save_validation_plan(plan_path, &plan)?;
        Ok(PlanOutcome { plan, summary })
    }

    pub async fn select(
        &self,
        requirements: &[Requirement],
        test_cases: &[TestCase],
        mode: SelectionMode,
    ) -> PlanResult<Selection> {
        match mode {
            SelectionMode::RuleBased => Ok(Selection {
                test_catalog: rule_based_selection(requirements, test_cases),
                citations: None,
            }),
            SelectionMode::LlmBased => self.select_with_llm(requirements, test_cases).await,
        }
    }

    async fn select_with_llm(
        &self,
        requirements: &[Requirement],
        test_cases: &[TestCase],
    ) -> PlanResult<Selection> {
        let judge = self.judge()?;
        let rag_context = self.rag_context().await;

        let mut selected = Vec::new();
        let mut citations = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let req_text = requirement.text();
            let picks = self
                .llm_based_selection(&req_text, test_cases, &rag_context)
                .await?;
            info!(
                target: "planner.llm",
                requirement = %requirement.id,
                selected = picks.len(),
                "requirement planned"
            );

            let response = serde_json::to_string(&picks)?;
            citations.push(judge.evaluate(&req_text, &rag_context, &response).await);
            selected.extend(picks);
        }

        Ok(Selection {
            test_catalog: selected,
            citations: Some(citations),
        })
    }

    fn judge(&self) -> PlanResult<Arc<CitationJudge>> {
        if let Some(judge) = &self.judge {
            return Ok(Arc::clone(judge));
        }
        self.llm
            .as_ref()
            .map(|llm| Arc::new(CitationJudge::new(Arc::clone(llm))))
            .ok_or(PlanError::MissingComponent("chat model"))
    }

    /// Retrieves reference context from the RAG index, or an empty string
    /// when no index is available.
    pub async fn rag_context(&self) -> String {
        let Some(rag) = &self.rag else {
            warn!(target: "planner", "rag index not found, run ingestion to build it");
            return String::new();
        };
        match rag.context(&self.config.rag_query, self.config.rag_top_k).await {
            Ok(context) => context,
            Err(err) => {
                warn!(target: "planner", "rag retrieval failed: {err}");
                String::new()
            }
        }
    }

    /// Ranks the catalog by embedding similarity to the requirement and asks
    /// the chat model to pick the applicable cases among the top candidates.
    pub async fn llm_based_selection(
        &self,
        req_text: &str,
        test_cases: &[TestCase],
        rag_context: &str,
    ) -> PlanResult<Vec<SelectedTestCase>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or(PlanError::MissingComponent("embedder"))?;
        let llm = self
            .llm
            .as_ref()
            .ok_or(PlanError::MissingComponent("chat model"))?;
        if test_cases.is_empty() {
            return Ok(Vec::new());
        }

        let query = if rag_context.is_empty() {
            req_text.to_string()
        } else {
            format!("{req_text}\n\nReference Documents:\n{rag_context}")
        };

        let query_vec = embedder.embed_one(&query).await?;
        let candidate_texts: Vec<String> =
            test_cases.iter().map(TestCase::candidate_text).collect();
        let candidate_vecs = embedder.embed(&candidate_texts).await?;
        if candidate_vecs.len() != test_cases.len() {
            return Err(PlanError::EmbeddingMismatch {
                expected: test_cases.len(),
                actual: candidate_vecs.len(),
            });
        }

        let ranked: Vec<&TestCase> =
            rank_by_similarity(&query_vec, &candidate_vecs, self.config.similarity_top_k)
                .into_iter()
                .map(|idx| &test_cases[idx])
                .collect();
        debug!(
            target: "planner.llm",
            candidates = ?ranked.iter().map(|case| case.id.as_str()).collect::<Vec<_>>(),
            "similarity shortlist"
        );

        let prompt = selection_prompt(&query, &ranked);
        let raw = match llm.chat(PLANNER_SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(target: "planner.llm", "selection call failed: {err}");
                return Ok(Vec::new());
            }
        };
        info!(target: "planner.llm", raw = %raw, "raw model response");

        let by_id: HashMap<&str, &TestCase> = test_cases
            .iter()
            .map(|case| (case.id.as_str(), case))
            .collect();
        let mut selected = parse_selection(&raw);
        for pick in selected.iter_mut() {
            match by_id.get(pick.id.as_str()) {
                Some(source) => pick.hydrate(source),
                None => warn!(target: "planner.llm", id = %pick.id, "model selected an id outside the catalog"),
            }
        }
        Ok(selected)
    }
}

fn selection_prompt(query: &str, ranked: &[&TestCase]) -> String {
    let block = ranked
        .iter()
        .map(|case| format!("{}: {}", case.id, case.title))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Requirement:\n{query}\n\n\
         Test Cases:\n{block}\n\n\
         Respond ONLY with a JSON array of the most relevant test IDs (e.g., 2206738500) that validate this requirement.\n\
         No explanation. Each item must include: id, title, domain, validation_category."
    )
}
