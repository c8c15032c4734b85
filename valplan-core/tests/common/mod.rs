#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use valplan_core::llm::ChatRole;
use valplan_core::{
    load_valplan_config, ChatBackend, ChatReply, ChatRequest, Embedder, LlmClient, LlmError,
    LlmResult, ValplanConfig,
};

const KEYWORDS: [&str; 8] = [
    "wifi",
    "standby",
    "usb4",
    "tunneling",
    "display",
    "validation",
    "power",
    "resume",
];

/// Bag-of-keywords embedder: one dimension per keyword plus a bias term so
/// no vector is all zeros.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    model: String,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::with_model("keyword-test")
    }

    pub fn with_model(model: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            model: model.to_string(),
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = KEYWORDS
            .iter()
            .map(|keyword| lower.matches(keyword).count() as f32)
            .collect();
        vector.push(0.1);
        vector
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> LlmResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| Self::vector(text)).collect())
    }
}

/// Embedder whose every call fails, as when the model server is down.
pub struct UnreachableEmbedder;

#[async_trait]
impl Embedder for UnreachableEmbedder {
    fn model(&self) -> &str {
        "unreachable"
    }

    async fn embed(&self, _texts: &[String]) -> LlmResult<Vec<Vec<f32>>> {
        Err(LlmError::Handler("connection refused".into()))
    }
}

/// Answers by role: planning prompts get test ids, judge prompts a verdict,
/// anything else a metadata object.
pub struct ScriptedChat {
    pub prompts: Mutex<Vec<(String, String)>>,
    fail_on: Option<String>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            fail_on: None,
        }
    }

    /// Planning prompts containing `needle` fail at the transport level.
    pub fn failing_on(needle: &str) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            fail_on: Some(needle.to_string()),
        }
    }

    pub fn prompts_containing(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(system, _)| system.contains(needle))
            .count()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn complete(&self, request: ChatRequest) -> LlmResult<ChatReply> {
        let system = request
            .messages
            .iter()
            .find(|m| m.role == ChatRole::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let user = request
            .messages
            .iter()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts
            .lock()
            .unwrap()
            .push((system.clone(), user.clone()));

        let content = if system.contains("planning agent") {
            if let Some(needle) = &self.fail_on {
                if user.contains(needle.as_str()) {
                    return Err(LlmError::Handler("model server unavailable".into()));
                }
            }
            if user.contains("[REQ-002]") {
                "```json\n[\"3333333333\"]\n```".to_string()
            } else {
                r#"[{"id": 1111111111, "title": "wrong title"}, {"id": "2222222222"}, {"id": "9999999999"}]"#
                    .to_string()
            }
        } else if system.contains("citation and judgment") {
            let verdict = if user.contains("Context:\n\n") {
                "Unsupported"
            } else {
                "Supported"
            };
            format!(
                r#"{{"verdict": "{verdict}", "explanation": "checked", "confidence": 88, "citations": ["Modern Standby with WiFi is validated by TCID 1111111111."]}}"#
            )
        } else {
            r#"{"domain": "connectivity", "interface": "USB4", "feature": "tunneling"}"#.to_string()
        };
        Ok(ChatReply {
            model: request.model,
            content,
        })
    }
}

pub fn llm_client(chat: Arc<ScriptedChat>) -> Arc<LlmClient> {
    Arc::new(LlmClient::new(chat, "scripted", Duration::from_secs(5)))
}

/// Copies the fixture data and guides into a temp workspace and loads a
/// config rooted there.
pub fn workspace() -> (TempDir, ValplanConfig) {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();
    for file in [
        "requirements.json",
        "tcd_baseline.json",
        "sample_validation_plan.json",
    ] {
        fs::copy(Path::new("../data").join(file), data_dir.join(file)).unwrap();
    }
    let docs_dir = root.join("docs/internal_guides");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::copy(
        "../docs/internal_guides/validation_planning.md",
        docs_dir.join("validation_planning.md"),
    )
    .unwrap();

    let config_path = root.join("valplan.toml");
    let template = fs::read_to_string("../configs/valplan.toml").unwrap();
    let rooted = template.replace(
        "base_dir = \".\"",
        &format!("base_dir = {:?}", root.to_string_lossy()),
    );
    fs::write(&config_path, rooted).unwrap();
    let mut config = load_valplan_config(&config_path).unwrap();
    config.executor.seed = Some(42);
    config.rag.chunk_size = 24;
    config.rag.chunk_overlap = 6;
    (temp, config)
}

pub fn plan_path(config: &ValplanConfig) -> PathBuf {
    config.plan_path()
}
