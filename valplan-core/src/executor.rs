use std::fmt;

use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::plan::ValidationPlan;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("invalid outcome weights: {0}")]
    InvalidWeights(String),
}

pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Fail,
    Skipped,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Pass, Outcome::Fail, Outcome::Skipped];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
            Outcome::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OutcomeWeights {
    pub pass: f64,
    pub fail: f64,
    pub skipped: f64,
}

impl Default for OutcomeWeights {
    fn default() -> Self {
        Self {
            pass: 0.7,
            fail: 0.2,
            skipped: 0.1,
        }
    }
}

impl OutcomeWeights {
    pub fn validate(&self) -> Result<(), String> {
        let weights = [self.pass, self.fail, self.skipped];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(format!(
                "weights must be finite and non-negative, got {weights:?}"
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err("at least one weight must be positive".into());
        }
        Ok(())
    }

    fn distribution(&self) -> ExecutorResult<WeightedIndex<f64>> {
        self.validate().map_err(ExecutorError::InvalidWeights)?;
        WeightedIndex::new([self.pass, self.fail, self.skipped])
            .map_err(|err| ExecutorError::InvalidWeights(err.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub id: String,
    pub title: String,
    pub domain: String,
    pub category: String,
    pub result: Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub records: Vec<ExecutionRecord>,
}

impl ExecutionRun {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Simulates execution: each planned test receives a weighted random outcome.
#[derive(Debug, Clone)]
pub struct Executor {
    weights: OutcomeWeights,
    seed: Option<u64>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(OutcomeWeights::default())
    }
}

impl Executor {
    pub fn new(weights: OutcomeWeights) -> Self {
        Self {
            weights,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn run(&self, plan: &ValidationPlan) -> ExecutorResult<ExecutionRun> {
        let mut rng = match self.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        let records = self.draw(plan, &mut rng)?;
        let run = ExecutionRun {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            seed: self.seed,
            records,
        };
        info!(
            target: "executor",
            run_id = %run.run_id,
            tests = run.len(),
            seeded = self.seed.is_some(),
            "simulated execution complete"
        );
        Ok(run)
    }

    pub fn draw<R>(&self, plan: &ValidationPlan, rng: &mut R) -> ExecutorResult<Vec<ExecutionRecord>>
    where
        R: Rng + ?Sized,
    {
        let distribution = self.weights.distribution()?;
        Ok(plan
            .test_catalog
            .iter()
            .map(|test| ExecutionRecord {
                id: test.id.clone(),
                title: test.title.clone(),
                domain: test.domain.clone(),
                category: test.validation_category.clone(),
                result: Outcome::ALL[distribution.sample(&mut *rng)],
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::SelectedTestCase;

    fn plan(count: usize) -> ValidationPlan {
        let mut plan = ValidationPlan::default();
        for idx in 0..count {
            plan.test_catalog.push(SelectedTestCase {
                id: format!("tc-{idx}"),
                title: format!("Test {idx}"),
                domain: if idx % 2 == 0 { "power" } else { "wifi" }.into(),
                validation_category: "CAT2".into(),
            });
        }
        plan
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let executor = Executor::default().with_seed(Some(7));
        let a = executor.run(&plan(20)).unwrap();
        let b = executor.run(&plan(20)).unwrap();
        let outcomes = |run: &ExecutionRun| run.records.iter().map(|r| r.result).collect::<Vec<_>>();
        assert_eq!(outcomes(&a), outcomes(&b));
        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn records_mirror_plan_order_and_category() {
        let run = Executor::default().run(&plan(3)).unwrap();
        let ids: Vec<&str> = run.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["tc-0", "tc-1", "tc-2"]);
        assert!(run.records.iter().all(|r| r.category == "CAT2"));
    }

    #[test]
    fn degenerate_weights_force_outcome() {
        let executor = Executor::new(OutcomeWeights {
            pass: 0.0,
            fail: 1.0,
            skipped: 0.0,
        });
        let run = executor.run(&plan(10)).unwrap();
        assert!(run.records.iter().all(|r| r.result == Outcome::Fail));
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let zero = Executor::new(OutcomeWeights {
            pass: 0.0,
            fail: 0.0,
            skipped: 0.0,
        });
        assert!(matches!(zero.run(&plan(1)), Err(ExecutorError::InvalidWeights(_))));

        let negative = OutcomeWeights {
            pass: -1.0,
            ..OutcomeWeights::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn weights_shape_the_distribution() {
        let executor = Executor::default();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let records = executor.draw(&plan(2000), &mut rng).unwrap();
        let passes = records.iter().filter(|r| r.result == Outcome::Pass).count();
        let ratio = passes as f64 / records.len() as f64;
        assert!((0.62..0.78).contains(&ratio), "pass ratio {ratio}");
    }

    #[test]
    fn empty_plan_yields_empty_run() {
        let run = Executor::default().run(&ValidationPlan::default()).unwrap();
        assert!(run.is_empty());
    }

    #[test]
    fn outcomes_serialize_uppercase() {
        assert_eq!(serde_json::to_value(Outcome::Skipped).unwrap(), "SKIPPED");
        assert_eq!(Outcome::Pass.to_string(), "PASS");
    }
}
