pub mod config;
pub mod error;
pub mod executor;
pub mod judge;
pub mod llm;
pub mod metadata;
pub mod orchestrator;
pub mod plan;
pub mod rag;
pub mod report;
pub mod sqlite;

pub use config::{
    load_valplan_config, BreakerSection, ExecutorSection, ModelsSection, PathsSection,
    PlannerSection, RagSection, ReporterSection, ValplanConfig,
};
pub use error::{ConfigError, Result};
pub use executor::{
    ExecutionRecord, ExecutionRun, Executor, ExecutorError, ExecutorResult, Outcome,
    OutcomeWeights,
};
pub use judge::{CitationJudge, Judgment, Verdict};
pub use llm::{
    ChatBackend, ChatReply, ChatRequest, CircuitBreakerConfig, Embedder, LlmClient, LlmError,
    LlmResult, OllamaChatBackend, OllamaEmbedder,
};
pub use metadata::{MetadataError, MetadataExtractor, RequirementMetadata};
pub use orchestrator::{
    load_citation_requests, CitationRequest, Orchestrator, OrchestratorError, OrchestratorResult,
    PipelineOutput, ReporterOutput,
};
pub use plan::{
    PlanError, PlanOutcome, PlanResult, PlanSummary, Planner, PlannerConfig, Requirement,
    SelectedTestCase, SelectionMode, TestCase, ValidationPlan,
};
pub use rag::{ChunkHit, IndexStats, IngestReport, RagError, RagRetriever, SqliteRagIndex};
pub use report::{DomainRow, Report, ReportError, Reporter, SearchMatch, Summary};
