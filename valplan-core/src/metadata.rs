use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::llm::{strip_code_fence, LlmClient, LlmError};
use crate::plan::models::lenient_string;

pub const METADATA_SYSTEM_PROMPT: &str =
    "You are an AI assistant helping to extract test planning metadata from product requirements.";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("model error: {0}")]
    Llm(#[from] LlmError),
    #[error("unparseable metadata reply ({source}): {raw}")]
    Parse {
        raw: String,
        source: serde_json::Error,
    },
}

pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequirementMetadata {
    #[serde(default, deserialize_with = "optional_string")]
    pub domain: Option<String>,
    #[serde(default, deserialize_with = "optional_string")]
    pub interface: Option<String>,
    #[serde(default, deserialize_with = "optional_string")]
    pub feature: Option<String>,
}

fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = lenient_string(deserializer)?;
    let trimmed = value.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

/// Tags a free-form requirement with domain, interface and feature labels.
pub struct MetadataExtractor {
    llm: Arc<LlmClient>,
}

impl MetadataExtractor {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn extract(&self, description: &str) -> MetadataResult<RequirementMetadata> {
        let raw = self
            .llm
            .chat(METADATA_SYSTEM_PROMPT, &metadata_prompt(description))
            .await?;
        debug!(target: "metadata", reply = %raw, "metadata reply");
        let metadata = parse_metadata(&raw)?;
        info!(
            target: "metadata",
            domain = metadata.domain.as_deref().unwrap_or("-"),
            interface = metadata.interface.as_deref().unwrap_or("-"),
            "metadata extracted"
        );
        Ok(metadata)
    }
}

pub fn parse_metadata(raw: &str) -> MetadataResult<RequirementMetadata> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|source| MetadataError::Parse {
        raw: raw.to_string(),
        source,
    })
}

fn metadata_prompt(description: &str) -> String {
    format!(
        "Requirement: \"{description}\"\n\n\
         Extract and return the following fields as JSON:\n\
         - domain: technical domain (e.g., power_management, artificial.intelligence, graphics, connectivity)\n\
         - interface: any interface mentioned (e.g., USB4, Type-C, PCIe)\n\
         - feature: core feature or function (e.g., tunneling, power gating)\n\n\
         Respond only with valid JSON:\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_reply() {
        let raw = "```json\n{\"domain\": \"connectivity\", \"interface\": \"USB4\", \"feature\": \"tunneling\"}\n```";
        let metadata = parse_metadata(raw).unwrap();
        assert_eq!(metadata.domain.as_deref(), Some("connectivity"));
        assert_eq!(metadata.interface.as_deref(), Some("USB4"));
        assert_eq!(metadata.feature.as_deref(), Some("tunneling"));
    }

    #[test]
    fn missing_and_blank_fields_are_none() {
        let metadata = parse_metadata(r#"{"domain": "graphics", "interface": "", "feature": null}"#).unwrap();
        assert_eq!(metadata.domain.as_deref(), Some("graphics"));
        assert_eq!(metadata.interface, None);
        assert_eq!(metadata.feature, None);
    }

    #[test]
    fn parse_failure_keeps_raw_reply() {
        match parse_metadata("domain: power") {
            Err(MetadataError::Parse { raw, .. }) => assert_eq!(raw, "domain: power"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn prompt_quotes_the_requirement() {
        let prompt = metadata_prompt("System must support USB4 tunneling over Type-C.");
        assert!(prompt.starts_with("Requirement: \"System must support USB4 tunneling over Type-C.\""));
        assert!(prompt.ends_with("Respond only with valid JSON:\n"));
    }
}
