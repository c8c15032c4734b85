pub mod catalog;
pub mod error;
pub mod models;
pub mod planner;
pub mod selection;

pub use catalog::{load_requirements, load_test_cases, load_validation_plan, save_validation_plan};
pub use error::{PlanError, PlanResult};
pub use models::{
    PlanSummary, Requirement, SelectedTestCase, SelectionMode, TestCase, ValidationPlan,
};
pub use planner::{PlanOutcome, Planner, PlannerConfig, Selection, PLANNER_SYSTEM_PROMPT};
pub use selection::{parse_selection, rank_by_similarity, rule_based_selection};
