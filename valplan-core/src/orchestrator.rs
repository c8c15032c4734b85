//! Wires the planner, executor, reporter and judge together from a single
//! [`ValplanConfig`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ValplanConfig;
use crate::error::ConfigError;
use crate::executor::{ExecutionRun, Executor, ExecutorError};
use crate::judge::{CitationJudge, Judgment};
use crate::llm::{ChatBackend, Embedder, LlmClient, OllamaChatBackend, OllamaEmbedder};
use crate::metadata::MetadataExtractor;
use crate::plan::models::lenient_string;
use crate::plan::{load_validation_plan, save_validation_plan, PlanError, PlanOutcome, Planner, PlannerConfig};
use crate::rag::{Chunker, ChunkHit, IngestReport, Ingestor, RagError, RagRetriever, SqliteRagIndex};
use crate::report::{Report, ReportError, Reporter, SearchMatch};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Rag(#[from] RagError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

/// One entry of a citation request file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CitationRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub requirement_text: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub context: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub llm_response: String,
}

pub fn load_citation_requests<P: AsRef<Path>>(path: P) -> OrchestratorResult<Vec<CitationRequest>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| OrchestratorError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| OrchestratorError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone)]
pub struct ReporterOutput {
    pub report: Report,
    pub matches: Vec<SearchMatch>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub plan: PlanOutcome,
    pub run: ExecutionRun,
    pub report: Report,
    pub matches: Vec<SearchMatch>,
}

pub struct Orchestrator {
    config: ValplanConfig,
    llm: Arc<LlmClient>,
    embedder: Arc<dyn Embedder>,
    rag_embedder: Arc<dyn Embedder>,
    seed: Option<u64>,
}

impl Orchestrator {
    /// Builds every component against the Ollama server named in `models`.
    pub fn from_config(config: ValplanConfig) -> OrchestratorResult<Self> {
        config.validate()?;
        let models = &config.models;
        let backend: Arc<dyn ChatBackend> = Arc::new(OllamaChatBackend::new(&models.base_url));
        let llm = LlmClient::new(backend, &models.chat_model, models.timeout())
            .with_breaker((&config.breaker).into())
            .with_temperature(models.temperature);
        let embedder: Arc<dyn Embedder> = Arc::new(
            OllamaEmbedder::new(&models.base_url, &models.embedding_model)
                .with_batch_size(models.embed_batch_size)
                .with_timeout(models.timeout()),
        );
        let rag_embedder: Arc<dyn Embedder> = match &config.rag.embedding_model {
            Some(model) if model != &models.embedding_model => Arc::new(
                OllamaEmbedder::new(&models.base_url, model)
                    .with_batch_size(models.embed_batch_size)
                    .with_timeout(models.timeout()),
            ),
            _ => Arc::clone(&embedder),
        };
        Ok(Self::new(config, Arc::new(llm), embedder, rag_embedder))
    }

    pub fn new(
        config: ValplanConfig,
        llm: Arc<LlmClient>,
        embedder: Arc<dyn Embedder>,
        rag_embedder: Arc<dyn Embedder>,
    ) -> Self {
        let seed = config.executor.seed;
        Self {
            config,
            llm,
            embedder,
            rag_embedder,
            seed,
        }
    }

    /// Overrides the configured executor seed.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        if seed.is_some() {
            self.seed = seed;
        }
        self
    }

    pub fn config(&self) -> &ValplanConfig {
        &self.config
    }

    pub fn judge(&self) -> CitationJudge {
        CitationJudge::new(Arc::clone(&self.llm))
    }

    pub fn metadata_extractor(&self) -> MetadataExtractor {
        MetadataExtractor::new(Arc::clone(&self.llm))
    }

    pub fn retriever(&self) -> OrchestratorResult<Option<RagRetriever>> {
        Ok(RagRetriever::open_if_exists(
            self.config.index_db_path(),
            Arc::clone(&self.rag_embedder),
        )?)
    }

    pub fn planner(&self) -> OrchestratorResult<Planner> {
        let mut planner = Planner::new(
            PlannerConfig::from(&self.config.planner),
            self.config.requirements_path(),
            self.config.catalog_path(),
        )
        .with_embedder(Arc::clone(&self.embedder))
        .with_llm(Arc::clone(&self.llm));
        if let Some(retriever) = self.retriever()? {
            planner = planner.with_rag(Arc::new(retriever));
        }
        Ok(planner)
    }

    pub fn reporter(&self) -> Reporter {
        Reporter::new(self.config.reporter.clone()).with_embedder(Arc::clone(&self.embedder))
    }

    pub async fn orchestrate_planner(
        &self,
        plan_path: impl AsRef<Path>,
        use_llm: bool,
    ) -> OrchestratorResult<PlanOutcome> {
        Ok(self.planner()?.run(plan_path, use_llm).await?)
    }

    pub fn orchestrate_executor(&self, plan_path: impl AsRef<Path>) -> OrchestratorResult<ExecutionRun> {
        let plan = load_validation_plan(plan_path)?;
        let executor = Executor::new(self.config.executor.weights()).with_seed(self.seed);
        Ok(executor.run(&plan)?)
    }

    /// Builds the report; a failed semantic search is logged and leaves the
    /// match list empty.
    pub async fn orchestrate_reporter(
        &self,
        run: &ExecutionRun,
        query: Option<&str>,
    ) -> OrchestratorResult<ReporterOutput> {
        let reporter = self.reporter();
        let report = reporter.report(run)?;
        let matches = match query.filter(|q| !q.trim().is_empty()) {
            Some(query) => match reporter.search(&run.records, query).await {
                Ok(matches) => matches,
                Err(err) => {
                    warn!(target: "reporter", "semantic search failed: {err}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        Ok(ReporterOutput { report, matches })
    }

    /// Runs the planner, then in LLM mode judges each request and stores the
    /// judgments as the plan's citations.
    pub async fn orchestrate_citation(
        &self,
        requests_path: impl AsRef<Path>,
        plan_path: impl AsRef<Path>,
        use_llm: bool,
    ) -> OrchestratorResult<PlanOutcome> {
        let requests = load_citation_requests(requests_path)?;
        let plan_path = plan_path.as_ref();
        let mut outcome = self.orchestrate_planner(plan_path, use_llm).await?;
        if !use_llm {
            return Ok(outcome);
        }

        let judge = self.judge();
        let mut citations: Vec<Judgment> = Vec::with_capacity(requests.len());
        for request in &requests {
            citations.push(
                judge
                    .evaluate(&request.requirement_text, &request.context, &request.llm_response)
                    .await,
            );
        }
        info!(target: "judge", requests = requests.len(), "citation requests judged");
        outcome.summary.citations = citations.len();
        outcome.plan.citations = Some(citations);
        save_validation_plan(plan_path, &outcome.plan)?;
        Ok(outcome)
    }

    pub async fn orchestrate(
        &self,
        plan_path: impl AsRef<Path>,
        use_llm: bool,
        query: Option<&str>,
    ) -> OrchestratorResult<PipelineOutput> {
        let plan_path = plan_path.as_ref();
        let plan = self.orchestrate_planner(plan_path, use_llm).await?;
        let executor = Executor::new(self.config.executor.weights()).with_seed(self.seed);
        let run = executor.run(&plan.plan)?;
        let ReporterOutput { report, matches } = self.orchestrate_reporter(&run, query).await?;
        info!(
            target: "orchestrator",
            selected = plan.summary.selected,
            pass_rate = report.summary.pass_rate,
            "pipeline complete"
        );
        Ok(PipelineOutput {
            plan,
            run,
            report,
            matches,
        })
    }

    pub async fn ingest(&self, docs_dir: Option<&Path>) -> OrchestratorResult<IngestReport> {
        let docs_dir = docs_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.docs_dir());
        let index = SqliteRagIndex::new(self.config.index_db_path())?;
        let chunker = Chunker::new(self.config.rag.chunk_size, self.config.rag.chunk_overlap);
        let ingestor = Ingestor::new(&index, self.rag_embedder.as_ref(), chunker)
            .with_extensions(&self.config.rag.extensions);
        Ok(ingestor.ingest_directory(docs_dir).await?)
    }

    /// Returns no hits when the index has not been built yet.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> OrchestratorResult<Vec<ChunkHit>> {
        match self.retriever()? {
            Some(retriever) => Ok(retriever.retrieve(query, top_k).await?),
            None => Ok(Vec::new()),
        }
    }
}
