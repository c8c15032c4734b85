//! Grounding judgment: asks the chat model whether an agent's output is
//! supported by the retrieved document context.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::{strip_code_fence, LlmClient};

pub const JUDGE_SYSTEM_PROMPT: &str = "\
You are a validation citation and judgment agent. Your job is to assess whether the response from a Planner Agent is grounded in the provided document context.

For each response, return a JSON object with:
- verdict: \"Supported\", \"Partially Supported\", or \"Unsupported\"
- explanation: Reasoning for the verdict
- confidence: Score from 0-100
- citations: Exact sentences or phrases from the context that support the output

Respond only in valid JSON format.";

pub const PARSE_FAILURE_EXPLANATION: &str = "Unable to parse model response.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    Supported,
    #[serde(rename = "Partially Supported", alias = "PartiallySupported", alias = "Partially supported")]
    PartiallySupported,
    Unsupported,
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Supported => "Supported",
            Verdict::PartiallySupported => "Partially Supported",
            Verdict::Unsupported => "Unsupported",
            Verdict::Error => "Error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Judgment {
    pub verdict: Verdict,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, deserialize_with = "confidence_score")]
    pub confidence: u8,
    #[serde(default, deserialize_with = "citation_list")]
    pub citations: Vec<String>,
}

impl Judgment {
    pub fn parse_failure() -> Self {
        Self {
            verdict: Verdict::Error,
            explanation: PARSE_FAILURE_EXPLANATION.to_string(),
            confidence: 0,
            citations: Vec::new(),
        }
    }

    pub fn is_grounded(&self) -> bool {
        matches!(
            self.verdict,
            Verdict::Supported | Verdict::PartiallySupported
        )
    }

    /// Parses a model reply; any deviation from the expected object yields
    /// the parse-failure judgment.
    pub fn from_reply(raw: &str) -> Self {
        match serde_json::from_str::<Judgment>(strip_code_fence(raw)) {
            Ok(judgment) => judgment,
            Err(err) => {
                warn!(target: "judge", "unparseable judgment: {err}");
                Self::parse_failure()
            }
        }
    }
}

fn confidence_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let score = match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(score.round().clamp(0.0, 100.0) as u8)
}

fn citation_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(text)) if !text.is_empty() => vec![text],
        _ => Vec::new(),
    })
}

pub struct CitationJudge {
    llm: Arc<LlmClient>,
}

impl CitationJudge {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn evaluate(&self, query: &str, context: &str, response: &str) -> Judgment {
        let prompt = judgment_prompt(query, context, response);
        let judgment = match self.llm.chat(JUDGE_SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => Judgment::from_reply(&raw),
            Err(err) => {
                warn!(target: "judge", "judgment call failed: {err}");
                Judgment::parse_failure()
            }
        };
        info!(
            target: "judge",
            verdict = %judgment.verdict,
            confidence = judgment.confidence,
            citations = judgment.citations.len(),
            "response judged"
        );
        judgment
    }

    /// Judges each output against its requirement; extra entries on either
    /// side are ignored.
    pub async fn batch_evaluate(
        &self,
        requirements: &[String],
        context: &str,
        outputs: &[String],
    ) -> Vec<Judgment> {
        let mut results = Vec::with_capacity(requirements.len().min(outputs.len()));
        for (requirement, output) in requirements.iter().zip(outputs) {
            results.push(self.evaluate(requirement, context, output).await);
        }
        results
    }
}

fn judgment_prompt(query: &str, context: &str, response: &str) -> String {
    format!("Query:\n{query}\n\nContext:\n{context}\n\nLLM Response:\n{response}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_reply() {
        let raw = r#"{
            "verdict": "Partially Supported",
            "explanation": "Only WiFi is covered",
            "confidence": 72.6,
            "citations": ["Modern Standby with WiFi is validated by TCID 1111111111."]
        }"#;
        let judgment = Judgment::from_reply(raw);
        assert_eq!(judgment.verdict, Verdict::PartiallySupported);
        assert_eq!(judgment.confidence, 73);
        assert_eq!(judgment.citations.len(), 1);
        assert!(judgment.is_grounded());
    }

    #[test]
    fn clamps_and_coerces_fields() {
        let raw = r#"{"verdict": "Supported", "confidence": "150%", "citations": "one line"}"#;
        let judgment = Judgment::from_reply(raw);
        assert_eq!(judgment.confidence, 100);
        assert_eq!(judgment.citations, vec!["one line"]);
        assert_eq!(judgment.explanation, "");

        let negative = Judgment::from_reply(r#"{"verdict": "Unsupported", "confidence": -4}"#);
        assert_eq!(negative.confidence, 0);
        assert!(!negative.is_grounded());
    }

    #[test]
    fn garbage_yields_error_verdict() {
        for raw in ["not json", r#"{"verdict": "Maybe"}"#, "[]", ""] {
            let judgment = Judgment::from_reply(raw);
            assert_eq!(judgment, Judgment::parse_failure(), "input: {raw:?}");
        }
        assert_eq!(
            Judgment::parse_failure().explanation,
            "Unable to parse model response."
        );
    }

    #[test]
    fn verdict_serializes_with_spaces() {
        let value = serde_json::to_value(Verdict::PartiallySupported).unwrap();
        assert_eq!(value, "Partially Supported");
        assert_eq!(Verdict::Error.to_string(), "Error");
    }

    struct EchoVerdict;

    #[async_trait::async_trait]
    impl crate::llm::ChatBackend for EchoVerdict {
        async fn complete(
            &self,
            request: crate::llm::ChatRequest,
        ) -> crate::llm::LlmResult<crate::llm::ChatReply> {
            let user = &request.messages[1].content;
            let content = if user.contains("unsupported") {
                r#"{"verdict": "Unsupported", "confidence": 10}"#
            } else {
                "no json here"
            };
            Ok(crate::llm::ChatReply {
                model: request.model,
                content: content.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn batch_pairs_requirements_with_outputs() {
        let llm = Arc::new(crate::llm::LlmClient::new(
            Arc::new(EchoVerdict),
            "test",
            std::time::Duration::from_secs(1),
        ));
        let judge = CitationJudge::new(llm);
        let requirements = vec!["unsupported claim".to_string(), "other".to_string()];
        let outputs = vec!["a".to_string(), "b".to_string(), "ignored".to_string()];

        let judgments = judge.batch_evaluate(&requirements, "ctx", &outputs).await;
        assert_eq!(judgments.len(), 2);
        assert_eq!(judgments[0].verdict, Verdict::Unsupported);
        assert_eq!(judgments[1], Judgment::parse_failure());
    }

    #[test]
    fn prompt_contains_sections() {
        let prompt = judgment_prompt("q", "ctx", "resp");
        assert_eq!(prompt, "Query:\nq\n\nContext:\nctx\n\nLLM Response:\nresp\n");
    }
}
