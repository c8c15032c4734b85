use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::judge::Judgment;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    RuleBased,
    LlmBased,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::RuleBased => "rule_based",
            SelectionMode::LlmBased => "llm_based",
        }
    }

    pub fn from_flag(use_llm: bool) -> Self {
        if use_llm {
            SelectionMode::LlmBased
        } else {
            SelectionMode::RuleBased
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Requirement {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_tags")]
    pub applicability: Vec<String>,
}

pub const REQUIREMENT_SEPARATOR: &str = " \u{2014} ";

impl Requirement {
    /// Prompt form of the requirement: bracketed id, title and description
    /// joined by `REQUIREMENT_SEPARATOR`, skipping empty parts.
    pub fn text(&self) -> String {
        let id = self.id.trim();
        let tagged_id = if id.is_empty() {
            String::new()
        } else {
            format!("[{id}]")
        };
        [tagged_id.as_str(), self.title.trim(), self.description.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(REQUIREMENT_SEPARATOR)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TestCase {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub domain: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub validation_category: String,
    #[serde(default, deserialize_with = "lenient_tags")]
    pub applicability: Vec<String>,
}

impl TestCase {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Text embedded for similarity ranking.
    pub fn candidate_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }

    pub fn to_selected(&self) -> SelectedTestCase {
        SelectedTestCase {
            id: self.id.clone(),
            title: self.title.clone(),
            domain: self.domain.clone(),
            validation_category: self.validation_category.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SelectedTestCase {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub domain: String,
    #[serde(default, deserialize_with = "lenient_string", alias = "category")]
    pub validation_category: String,
}

impl SelectedTestCase {
    /// Fills fields the model left blank from the catalog entry.
    pub fn hydrate(&mut self, source: &TestCase) {
        if self.title.is_empty() {
            self.title = source.title.clone();
        }
        if self.domain.is_empty() {
            self.domain = source.domain.clone();
        }
        if self.validation_category.is_empty() {
            self.validation_category = source.validation_category.clone();
        }
    }
}

/// A validation plan document. Keys other than the catalog and citations
/// are carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ValidationPlan {
    #[serde(default)]
    pub test_catalog: Vec<SelectedTestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Judgment>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlanSummary {
    pub mode: SelectionMode,
    pub requirements: usize,
    pub catalog_size: usize,
    pub selected: usize,
    pub citations: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl RawScalar {
    fn into_string(self) -> String {
        match self {
            RawScalar::Text(value) => value,
            RawScalar::Integer(value) => value.to_string(),
            RawScalar::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                format!("{}", value as i64)
            }
            RawScalar::Float(value) => value.to_string(),
            RawScalar::Bool(value) => value.to_string(),
        }
    }
}

/// Accepts strings, numbers (spreadsheet exports store ids as numbers) and null.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawScalar>::deserialize(deserializer)?
        .map(RawScalar::into_string)
        .unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<Option<RawScalar>>),
    Joined(String),
}

/// Accepts a list of tags or a single comma separated string.
fn lenient_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tags = match Option::<RawTags>::deserialize(deserializer)? {
        Some(RawTags::List(items)) => items
            .into_iter()
            .flatten()
            .map(RawScalar::into_string)
            .collect(),
        Some(RawTags::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
        None => Vec::new(),
    };
    Ok(tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requirement_text_skips_empty_parts() {
        let req = Requirement {
            id: " REQ-1 ".into(),
            title: "Modern Standby".into(),
            description: "  System must support MS States with WiFi ".into(),
            applicability: vec![],
        };
        assert_eq!(
            req.text(),
            ["[REQ-1]", "Modern Standby", "System must support MS States with WiFi"]
                .join(REQUIREMENT_SEPARATOR)
        );

        let untitled = Requirement {
            description: "only a description".into(),
            ..Requirement::default()
        };
        assert_eq!(untitled.text(), "only a description");
        assert_eq!(Requirement::default().text(), "");
    }

    #[test]
    fn numeric_ids_and_joined_tags_are_accepted() {
        let case: TestCase = serde_json::from_value(json!({
            "id": 2206738500u64,
            "title": null,
            "domain": "power_management",
            "validation_category": "CAT2",
            "applicability": "power_management, connectivity.wifi"
        }))
        .unwrap();
        assert_eq!(case.id, "2206738500");
        assert_eq!(case.title, "");
        assert_eq!(
            case.applicability,
            vec!["power_management", "connectivity.wifi"]
        );

        let float_id: SelectedTestCase =
            serde_json::from_value(json!({"id": 1111111111.0, "category": "CAT3"})).unwrap();
        assert_eq!(float_id.id, "1111111111");
        assert_eq!(float_id.validation_category, "CAT3");
    }

    #[test]
    fn plan_preserves_unknown_keys() {
        let plan: ValidationPlan = serde_json::from_value(json!({
            "plan_name": "Sample",
            "owner": {"team": "validation"},
            "test_catalog": [{"id": "1", "title": "t", "domain": "d", "validation_category": "CAT2"}]
        }))
        .unwrap();
        assert_eq!(plan.test_catalog.len(), 1);
        assert!(plan.citations.is_none());
        assert_eq!(plan.extra.get("plan_name"), Some(&json!("Sample")));

        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["owner"]["team"], "validation");
        assert!(value.get("citations").is_none());
    }

    #[test]
    fn hydrate_fills_only_blank_fields() {
        let mut source = TestCase::new("1", "Catalog title");
        source.domain = "graphics".into();
        source.validation_category = "CAT3".into();
        let mut selected = SelectedTestCase {
            id: "1".into(),
            title: "Model title".into(),
            ..SelectedTestCase::default()
        };
        selected.hydrate(&source);
        assert_eq!(selected.title, "Model title");
        assert_eq!(selected.domain, "graphics");
        assert_eq!(selected.validation_category, "CAT3");
    }
}
