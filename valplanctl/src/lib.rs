use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use valplan_core::orchestrator::ReporterOutput;
use valplan_core::{
    load_valplan_config, ExecutionRun, MetadataError, Orchestrator, OrchestratorError,
    ReportError, ValplanConfig,
};

pub mod commands;

use commands::knowledge::{ExtractArgs, IngestArgs, JudgeArgs, RetrieveArgs, RetrieveView};
use commands::pipeline::{
    CiteArgs, ExecuteArgs, PlanArgs, PlanView, ReportArgs, ReportView, RunArgs, RunView,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] valplan_core::ConfigError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("report error: {0}")]
    Report(#[from] ReportError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Validation planning pipeline control interface", long_about = None)]
pub struct Cli {
    /// Path of the main valplan.toml
    #[arg(long, default_value = "configs/valplan.toml")]
    pub config: PathBuf,
    /// Overrides paths.base_dir
    #[arg(long)]
    pub base_dir: Option<PathBuf>,
    /// Overrides paths.data_dir
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Alternative validation plan file
    #[arg(long)]
    pub plan: Option<PathBuf>,
    /// Overrides paths.index_dir
    #[arg(long)]
    pub index_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Selects test cases for the requirements and writes the plan
    Plan(PlanArgs),
    /// Simulates execution of the current plan
    Execute(ExecuteArgs),
    /// Summarizes an execution run
    Report(ReportArgs),
    /// Plan, execute and report in one pass
    Run(RunArgs),
    /// Judges whether a response is grounded in a context
    Judge(JudgeArgs),
    /// Runs the planner and judges a file of citation requests
    Cite(CiteArgs),
    /// Indexes the documents directory for retrieval
    Ingest(IngestArgs),
    /// Prints the chunks nearest to a query
    Retrieve(RetrieveArgs),
    /// Extracts domain, interface and feature from a requirement
    Extract(ExtractArgs),
    /// Checks configured files, directories and the index
    #[command(name = "health")]
    Health,
    /// Prints a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "valplanctl", &mut std::io::stdout());
        return Ok(());
    }

    let context = AppContext::new(&cli)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(context.dispatch(&cli.command, cli.format))
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

struct AppContext {
    config: ValplanConfig,
    config_path: PathBuf,
    plan_path: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone();
        let mut config = load_valplan_config(&config_path)?;

        if let Some(base_dir) = &cli.base_dir {
            config.paths.base_dir = base_dir.to_string_lossy().into_owned();
        }
        if let Some(data_dir) = &cli.data_dir {
            config.paths.data_dir = data_dir.to_string_lossy().into_owned();
        }
        if let Some(index_dir) = &cli.index_dir {
            config.paths.index_dir = index_dir.to_string_lossy().into_owned();
        }
        let plan_path = cli.plan.clone().unwrap_or_else(|| config.plan_path());

        Ok(Self {
            config,
            config_path,
            plan_path,
        })
    }

    fn orchestrator(&self, seed: Option<u64>) -> Result<Orchestrator> {
        Ok(Orchestrator::from_config(self.config.clone())?.with_seed(seed))
    }

    async fn dispatch(&self, command: &Commands, format: OutputFormat) -> Result<()> {
        match command {
            Commands::Plan(args) => render(&self.plan(args).await?, format),
            Commands::Execute(args) => render(&self.execute(args)?, format),
            Commands::Report(args) => render(&self.report(args).await?, format),
            Commands::Run(args) => render(&self.run_pipeline(args).await?, format),
            Commands::Judge(args) => {
                let judgment = self
                    .orchestrator(None)?
                    .judge()
                    .evaluate(&args.query, &args.context, &args.response)
                    .await;
                render(&judgment, format)
            }
            Commands::Cite(args) => render(&self.cite(args).await?, format),
            Commands::Ingest(args) => {
                let report = self.orchestrator(None)?.ingest(args.docs.as_deref()).await?;
                render(&report, format)
            }
            Commands::Retrieve(args) => render(&self.retrieve(args).await?, format),
            Commands::Extract(args) => {
                let metadata = self
                    .orchestrator(None)?
                    .metadata_extractor()
                    .extract(&args.description)
                    .await?;
                render(&metadata, format)
            }
            Commands::Health => {
                let report = self.health_check();
                render(&report, format)?;
                if report
                    .iter()
                    .any(|entry| matches!(entry.status, CheckStatus::Error))
                {
                    return Err(AppError::MissingResource(
                        "one or more checks failed".to_string(),
                    ));
                }
                Ok(())
            }
            Commands::Completions { .. } => Ok(()),
        }
    }

    async fn plan(&self, args: &PlanArgs) -> Result<PlanView> {
        let outcome = self
            .orchestrator(None)?
            .orchestrate_planner(&self.plan_path, args.llm)
            .await?;
        Ok(PlanView::new(self.plan_path.clone(), outcome))
    }

    fn execute(&self, args: &ExecuteArgs) -> Result<ExecutionRun> {
        let run = self
            .orchestrator(args.seed)?
            .orchestrate_executor(&self.plan_path)?;
        if let Some(path) = &args.save {
            write_json(path, &run)?;
            info!(path = %path.display(), "execution run saved");
        }
        Ok(run)
    }

    async fn report(&self, args: &ReportArgs) -> Result<ReportView> {
        let orchestrator = self.orchestrator(args.seed)?;
        let run = match &args.run {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                serde_json::from_str::<ExecutionRun>(&content)?
            }
            None => orchestrator.orchestrate_executor(&self.plan_path)?,
        };
        let output = orchestrator
            .orchestrate_reporter(&run, args.query.as_deref())
            .await?;
        self.report_view(&orchestrator, output, args.out.as_deref())
    }

    async fn run_pipeline(&self, args: &RunArgs) -> Result<RunView> {
        let orchestrator = self.orchestrator(args.seed)?;
        let output = orchestrator
            .orchestrate(&self.plan_path, args.llm, args.query.as_deref())
            .await?;
        let report = self.report_view(
            &orchestrator,
            ReporterOutput {
                report: output.report,
                matches: output.matches,
            },
            args.out.as_deref(),
        )?;
        Ok(RunView {
            plan: PlanView::new(self.plan_path.clone(), output.plan),
            report,
        })
    }

    fn report_view(
        &self,
        orchestrator: &Orchestrator,
        output: ReporterOutput,
        out: Option<&Path>,
    ) -> Result<ReportView> {
        let artifacts = match out {
            Some(dir) => Some(orchestrator.reporter().write_artifacts(&output.report, dir)?),
            None => None,
        };
        Ok(ReportView {
            report: output.report,
            matches: output.matches,
            artifacts,
        })
    }

    async fn cite(&self, args: &CiteArgs) -> Result<PlanView> {
        let outcome = self
            .orchestrator(None)?
            .orchestrate_citation(&args.requests, &self.plan_path, args.llm)
            .await?;
        Ok(PlanView::new(self.plan_path.clone(), outcome))
    }

    async fn retrieve(&self, args: &RetrieveArgs) -> Result<RetrieveView> {
        let top_k = args.top_k.unwrap_or(self.config.planner.rag_top_k);
        let hits = self
            .orchestrator(None)?
            .retrieve(&args.query, top_k)
            .await?;
        Ok(RetrieveView {
            query: args.query.clone(),
            hits,
        })
    }

    fn health_check(&self) -> Vec<HealthEntry> {
        vec![
            self.check_path("valplan.toml", &self.config_path),
            self.check_path("requirements", &self.config.requirements_path()),
            self.check_path("test catalog", &self.config.catalog_path()),
            self.check_path("validation plan", &self.plan_path),
            self.check_directory("docs", &self.config.docs_dir()),
            self.check_directory("reports", &self.config.reports_dir()),
            self.check_database("rag index", &self.config.index_db_path()),
        ]
    }

    fn check_path(&self, name: &str, path: &Path) -> HealthEntry {
        if path.exists() {
            HealthEntry::ok(name, format!("{}", path.display()))
        } else {
            HealthEntry::error(name, format!("{path} missing", path = path.display()))
        }
    }

    fn check_directory(&self, name: &str, path: &Path) -> HealthEntry {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => HealthEntry::ok(name, format!("{}", path.display())),
            Ok(_) => HealthEntry::warn(
                name,
                format!("{path} is not a directory", path = path.display()),
            ),
            Err(_) => HealthEntry::warn(name, format!("{path} not found", path = path.display())),
        }
    }

    fn check_database(&self, name: &str, path: &Path) -> HealthEntry {
        if !path.exists() {
            return HealthEntry::warn(
                name,
                format!("{path} not found, run ingest", path = path.display()),
            );
        }
        match self.open_database(path) {
            Ok(conn) => {
                let pragma: rusqlite::Result<String> =
                    conn.query_row("PRAGMA integrity_check;", [], |row| row.get(0));
                match pragma {
                    Ok(result) if result.to_lowercase() == "ok" => {
                        HealthEntry::ok(name, "integrity ok".to_string())
                    }
                    Ok(result) => HealthEntry::warn(name, format!("integrity_check: {result}")),
                    Err(err) => HealthEntry::warn(name, format!("error: {err}")),
                }
            }
            Err(err) => HealthEntry::error(name, format!("failed to open: {err}")),
        }
    }

    fn open_database(&self, path: &Path) -> Result<Connection> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(conn)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(HealthEntry::display)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for HealthEntry {
    fn display(&self) -> String {
        format!(
            "[{status}] {name}: {detail}",
            status = self.status,
            name = self.name,
            detail = self.detail
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn prepare_test_context() -> (TempDir, AppContext) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let configs_dir = root.join("configs");
        fs::create_dir_all(&configs_dir).unwrap();
        fs::copy("../configs/valplan.toml", configs_dir.join("valplan.toml")).unwrap();

        let data_dir = root.join("data");
        fs::create_dir_all(&data_dir).unwrap();
        for file in [
            "requirements.json",
            "tcd_baseline.json",
            "sample_validation_plan.json",
        ] {
            fs::copy(format!("../data/{file}"), data_dir.join(file)).unwrap();
        }
        fs::create_dir_all(root.join("docs/internal_guides")).unwrap();

        let cli = Cli {
            config: configs_dir.join("valplan.toml"),
            base_dir: Some(root.to_path_buf()),
            data_dir: None,
            plan: None,
            index_dir: None,
            format: OutputFormat::Json,
            command: Commands::Health,
        };
        let context = AppContext::new(&cli).unwrap();
        (temp, context)
    }

    #[tokio::test]
    async fn rule_plan_is_written_back() {
        let (_temp, context) = prepare_test_context();
        let view = context.plan(&PlanArgs { llm: false }).await.unwrap();
        assert_eq!(view.summary.selected, 3);

        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&context.plan_path).unwrap()).unwrap();
        assert_eq!(saved["test_catalog"].as_array().unwrap().len(), 3);
        assert_eq!(saved["owner"], "validation-architecture");
        assert!(view.display().contains("1111111111"));
    }

    #[tokio::test]
    async fn saved_run_feeds_the_report() {
        let (temp, context) = prepare_test_context();
        context.plan(&PlanArgs { llm: false }).await.unwrap();

        let run_path = temp.path().join("runs/run.json");
        let run = context
            .execute(&ExecuteArgs {
                seed: Some(11),
                save: Some(run_path.clone()),
            })
            .unwrap();
        assert_eq!(run.records.len(), 3);

        let out = temp.path().join("reports");
        let view = context
            .report(&ReportArgs {
                run: Some(run_path),
                seed: None,
                query: None,
                out: Some(out.clone()),
            })
            .await
            .unwrap();
        assert_eq!(view.report.run_id, run.run_id);
        assert_eq!(view.report.summary.total, 3);
        assert!(out.join("summary.png").exists());
        assert!(view.matches.is_empty());
    }

    #[test]
    fn health_flags_missing_index_as_warning() {
        let (_temp, context) = prepare_test_context();
        let report = context.health_check();
        let index = report.iter().find(|entry| entry.name == "rag index").unwrap();
        assert!(matches!(index.status, CheckStatus::Warn));
        assert!(!report
            .iter()
            .any(|entry| matches!(entry.status, CheckStatus::Error)));
    }

    #[test]
    fn health_reports_missing_inputs() {
        let (temp, context) = prepare_test_context();
        fs::remove_file(temp.path().join("data/requirements.json")).unwrap();
        let report = context.health_check();
        let requirements = report
            .iter()
            .find(|entry| entry.name == "requirements")
            .unwrap();
        assert!(matches!(requirements.status, CheckStatus::Error));
    }

    #[test]
    fn cli_parses_pipeline_flags() {
        let cli = Cli::try_parse_from([
            "valplanctl", "--format", "json", "run", "--llm", "--seed", "3", "--query", "wifi",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert!(args.llm);
                assert_eq!(args.seed, Some(3));
                assert_eq!(args.query.as_deref(), Some("wifi"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
