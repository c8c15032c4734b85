use std::collections::HashSet;

use serde_json::Value;
use tracing::warn;

use crate::llm::{cosine_similarity, strip_code_fence};

use super::models::{Requirement, SelectedTestCase, TestCase};

/// Selects every test case whose applicability tags intersect the union of
/// the requirements' tags. Catalog order is preserved.
pub fn rule_based_selection(
    requirements: &[Requirement],
    test_cases: &[TestCase],
) -> Vec<SelectedTestCase> {
    let required: HashSet<&str> = requirements
        .iter()
        .flat_map(|req| req.applicability.iter().map(String::as_str))
        .collect();
    if required.is_empty() {
        return Vec::new();
    }

    test_cases
        .iter()
        .filter(|case| {
            case.applicability
                .iter()
                .any(|tag| required.contains(tag.as_str()))
        })
        .map(TestCase::to_selected)
        .collect()
}

/// Returns candidate indices ordered by descending cosine similarity to the
/// query, truncated to `top_k`. Ties keep their original order and NaN
/// scores rank last.
pub fn rank_by_similarity(query: &[f32], candidates: &[Vec<f32>], top_k: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| {
            let score = cosine_similarity(query, candidate);
            (idx, if score.is_nan() { f32::NEG_INFINITY } else { score })
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored.into_iter().map(|(idx, _)| idx).collect()
}

/// Interprets a model reply as a list of selected test cases.
///
/// Arrays are taken as-is, objects contribute their `selected_test_case`
/// array. Anything else yields an empty selection.
pub fn parse_selection(raw: &str) -> Vec<SelectedTestCase> {
    let payload = strip_code_fence(raw);
    let parsed: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(err) => {
            warn!(target: "planner.llm", "failed to parse model response: {err}");
            return Vec::new();
        }
    };

    let items = match parsed {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("selected_test_case") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items.into_iter().filter_map(selection_item).collect()
}

fn selection_item(item: Value) -> Option<SelectedTestCase> {
    match item {
        Value::Object(_) => match serde_json::from_value::<SelectedTestCase>(item) {
            Ok(selected) if !selected.id.is_empty() => Some(selected),
            Ok(_) => None,
            Err(err) => {
                warn!(target: "planner.llm", "skipping malformed selection item: {err}");
                None
            }
        },
        Value::String(id) if !id.trim().is_empty() => Some(SelectedTestCase {
            id: id.trim().to_string(),
            ..SelectedTestCase::default()
        }),
        Value::Number(id) => Some(SelectedTestCase {
            id: id.to_string(),
            ..SelectedTestCase::default()
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: &str, tags: &[&str]) -> TestCase {
        let mut case = TestCase::new(id, format!("title {id}"));
        case.applicability = tags.iter().map(|tag| tag.to_string()).collect();
        case
    }

    fn requirement(tags: &[&str]) -> Requirement {
        Requirement {
            applicability: tags.iter().map(|tag| tag.to_string()).collect(),
            ..Requirement::default()
        }
    }

    #[test]
    fn rule_selection_uses_union_of_tags() {
        let requirements = vec![requirement(&["wifi"]), requirement(&["usb"])];
        let catalog = vec![
            case("a", &["graphics"]),
            case("b", &["usb", "graphics"]),
            case("c", &["wifi"]),
            case("d", &[]),
        ];
        let selected = rule_based_selection(&requirements, &catalog);
        let ids: Vec<&str> = selected.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn rule_selection_without_tags_is_empty() {
        let catalog = vec![case("a", &["wifi"])];
        assert!(rule_based_selection(&[requirement(&[])], &catalog).is_empty());
        assert!(rule_based_selection(&[], &catalog).is_empty());
    }

    #[test]
    fn ranking_orders_by_similarity() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.1],
            vec![0.7, 0.7],
            vec![1.0, 0.1],
        ];
        assert_eq!(rank_by_similarity(&query, &candidates, 3), vec![1, 3, 2]);
        assert_eq!(rank_by_similarity(&query, &candidates, 10).len(), 4);
        assert!(rank_by_similarity(&query, &[], 5).is_empty());
    }

    #[test]
    fn nan_candidates_rank_last() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![f32::NAN, 1.0], vec![0.0, 1.0], vec![1.0, 0.0]];
        assert_eq!(rank_by_similarity(&query, &candidates, 3), vec![2, 1, 0]);
    }

    #[test]
    fn parses_arrays_objects_and_garbage() {
        let array = r#"[{"id": 2206738500, "title": "t", "domain": "d", "validation_category": "CAT2"}, "123", 456]"#;
        let parsed = parse_selection(array);
        let ids: Vec<&str> = parsed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["2206738500", "123", "456"]);

        let object = r#"{"selected_test_case": [{"id": "1"}]}"#;
        assert_eq!(parse_selection(object).len(), 1);
        assert!(parse_selection(r#"{"other": []}"#).is_empty());
        assert!(parse_selection("42").is_empty());
        assert!(parse_selection("Sure! Here are the tests.").is_empty());
    }

    #[test]
    fn parses_fenced_reply() {
        let fenced = "```json\n[{\"id\": \"9\", \"title\": \"x\"}]\n```";
        let parsed = parse_selection(fenced);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, "9");
    }
}
