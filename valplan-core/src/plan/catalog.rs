use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::debug;

use super::models::{Requirement, TestCase, ValidationPlan};
use super::{PlanError, PlanResult};

pub fn load_requirements<P: AsRef<Path>>(path: P) -> PlanResult<Vec<Requirement>> {
    read_json(path.as_ref())
}

pub fn load_test_cases<P: AsRef<Path>>(path: P) -> PlanResult<Vec<TestCase>> {
    read_json(path.as_ref())
}

pub fn load_validation_plan<P: AsRef<Path>>(path: P) -> PlanResult<ValidationPlan> {
    read_json(path.as_ref())
}

/// Writes the plan through a temp file in the same directory, then renames
/// it over the target so readers never observe a half-written plan.
pub fn save_validation_plan<P: AsRef<Path>>(path: P, plan: &ValidationPlan) -> PlanResult<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|source| PlanError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let serialized = serde_json::to_string_pretty(plan)?;
    let write_err = |source| PlanError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(serialized.as_bytes()).map_err(write_err)?;
    file.write_all(b"\n").map_err(write_err)?;
    file.persist(path)
        .map_err(|err| PlanError::Write {
            path: path.to_path_buf(),
            source: err.error,
        })?;
    debug!(target: "planner", path = %path.display(), "validation plan written");
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> PlanResult<T> {
    let content = fs::read_to_string(path).map_err(|source| PlanError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| PlanError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::models::SelectedTestCase;
    use tempfile::TempDir;

    #[test]
    fn plan_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/plan.json");
        let mut plan = ValidationPlan::default();
        plan.extra
            .insert("plan_name".into(), serde_json::json!("Nightly"));
        plan.test_catalog.push(SelectedTestCase {
            id: "1111111111".into(),
            title: "Modern Standby".into(),
            domain: "power_management".into(),
            validation_category: "CAT2".into(),
        });

        save_validation_plan(&path, &plan).unwrap();
        let loaded = load_validation_plan(&path).unwrap();
        assert_eq!(loaded, plan);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_requirements("/definitely/not/here.json").unwrap_err();
        match err {
            PlanError::Read { path, .. } => assert!(path.ends_with("here.json")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_json_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_test_cases(&path),
            Err(PlanError::Json { .. })
        ));
    }

    #[test]
    fn fixture_data_parses() {
        let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("../data");
        let requirements = load_requirements(data.join("requirements.json")).unwrap();
        let catalog = load_test_cases(data.join("tcd_baseline.json")).unwrap();
        assert_eq!(requirements.len(), 2);
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog[0].id, "1111111111");
    }
}
