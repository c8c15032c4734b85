use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::executor::OutcomeWeights;
use crate::llm::CircuitBreakerConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ValplanConfig {
    pub paths: PathsSection,
    pub models: ModelsSection,
    #[serde(default)]
    pub breaker: BreakerSection,
    #[serde(default)]
    pub planner: PlannerSection,
    #[serde(default)]
    pub rag: RagSection,
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub reporter: ReporterSection,
}

impl ValplanConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn data_path(&self, file: &str) -> PathBuf {
        self.resolve_path(Path::new(&self.paths.data_dir).join(file))
    }

    pub fn requirements_path(&self) -> PathBuf {
        self.data_path(&self.paths.requirements_file)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_path(&self.paths.catalog_file)
    }

    pub fn plan_path(&self) -> PathBuf {
        self.data_path(&self.paths.plan_file)
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.docs_dir)
    }

    pub fn index_db_path(&self) -> PathBuf {
        self.resolve_path(&self.paths.index_dir).join("index.sqlite")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.reports_dir)
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.planner.similarity_top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "planner.similarity_top_k",
                reason: "must be at least 1".into(),
            });
        }
        if self.rag.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "rag.chunk_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(ConfigError::Invalid {
                field: "rag.chunk_overlap",
                reason: format!(
                    "overlap {} must be smaller than chunk size {}",
                    self.rag.chunk_overlap, self.rag.chunk_size
                ),
            });
        }
        if let Err(reason) = self.executor.weights().validate() {
            return Err(ConfigError::Invalid {
                field: "executor",
                reason,
            });
        }
        if !(0.0..=1.0).contains(&self.breaker.failure_threshold) {
            return Err(ConfigError::Invalid {
                field: "breaker.failure_threshold",
                reason: "must be within 0.0..=1.0".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub data_dir: String,
    pub requirements_file: String,
    pub catalog_file: String,
    pub plan_file: String,
    pub docs_dir: String,
    pub index_dir: String,
    pub reports_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsSection {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_embed_batch")]
    pub embed_batch_size: usize,
}

impl ModelsSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

fn default_embed_batch() -> usize {
    32
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub window_size: usize,
    pub min_calls: usize,
    pub failure_threshold: f64,
    pub open_for_seconds: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            window_size: defaults.window_size,
            min_calls: defaults.min_calls,
            failure_threshold: defaults.failure_threshold,
            open_for_seconds: defaults.open_for.as_secs(),
        }
    }
}

impl From<&BreakerSection> for CircuitBreakerConfig {
    fn from(section: &BreakerSection) -> Self {
        Self {
            window_size: section.window_size.max(1),
            min_calls: section.min_calls,
            failure_threshold: section.failure_threshold,
            open_for: Duration::from_secs(section.open_for_seconds),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    pub similarity_top_k: usize,
    pub rag_query: String,
    pub rag_top_k: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            similarity_top_k: 5,
            rag_query: "Validation Planning".into(),
            rag_top_k: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagSection {
    pub embedding_model: Option<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub extensions: Vec<String>,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            embedding_model: None,
            chunk_size: 1024,
            chunk_overlap: 200,
            extensions: vec!["md".into(), "txt".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub pass_weight: f64,
    pub fail_weight: f64,
    pub skip_weight: f64,
    pub seed: Option<u64>,
}

impl ExecutorSection {
    pub fn weights(&self) -> OutcomeWeights {
        OutcomeWeights {
            pass: self.pass_weight,
            fail: self.fail_weight,
            skipped: self.skip_weight,
        }
    }
}

impl Default for ExecutorSection {
    fn default() -> Self {
        let weights = OutcomeWeights::default();
        Self {
            pass_weight: weights.pass,
            fail_weight: weights.fail,
            skip_weight: weights.skipped,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReporterSection {
    pub search_k: usize,
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for ReporterSection {
    fn default() -> Self {
        Self {
            search_k: 3,
            chart_width: 640,
            chart_height: 480,
        }
    }
}

pub fn load_valplan_config<P: AsRef<Path>>(path: P) -> Result<ValplanConfig> {
    let config: ValplanConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
