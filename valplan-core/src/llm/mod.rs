use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

pub mod embedding;

pub use embedding::{cosine_similarity, l2_distance, Embedder, OllamaEmbedder};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("model server returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("circuit open, model calls suspended")]
    CircuitOpen,
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("backend error: {0}")]
    Handler(String),
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub model: String,
    pub content: String,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> LlmResult<ChatReply>;
}

/// Talks to an Ollama server through the non-streaming `/api/chat` endpoint.
pub struct OllamaChatBackend {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaChatBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    message: Option<OllamaResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl ChatBackend for OllamaChatBackend {
    async fn complete(&self, request: ChatRequest) -> LlmResult<ChatReply> {
        let body = OllamaChatRequest {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            options: request
                .temperature
                .map(|temperature| OllamaOptions { temperature }),
        };
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed = response.json::<OllamaChatResponse>().await?;
        let content = parsed
            .message
            .map(|message| message.content)
            .ok_or(LlmError::EmptyResponse)?;
        Ok(ChatReply {
            model: if parsed.model.is_empty() {
                request.model
            } else {
                parsed.model
            },
            content,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub window_size: usize,
    /// Outcomes the window must hold before the failure rate is evaluated.
    pub min_calls: usize,
    pub failure_threshold: f64,
    pub open_for: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            min_calls: 10,
            failure_threshold: 0.10,
            open_for: Duration::from_secs(300),
        }
    }
}

struct CircuitBreaker {
    config: CircuitBreakerConfig,
    outcomes: VecDeque<bool>,
    state: CircuitState,
    open_until: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

enum CircuitDecision {
    Proceed,
    ShortCircuit,
}

impl CircuitBreaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            outcomes: VecDeque::with_capacity(config.window_size),
            state: CircuitState::Closed,
            open_until: None,
        }
    }

    fn before_call(&mut self, now: Instant) -> CircuitDecision {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => CircuitDecision::Proceed,
            CircuitState::Open => match self.open_until {
                Some(until) if now < until => CircuitDecision::ShortCircuit,
                _ => {
                    self.state = CircuitState::HalfOpen;
                    CircuitDecision::Proceed
                }
            },
        }
    }

    fn record(&mut self, now: Instant, success: bool) {
        match self.state {
            CircuitState::HalfOpen => {
                if success {
                    self.state = CircuitState::Closed;
                    self.outcomes.clear();
                } else {
                    self.trip(now);
                }
            }
            CircuitState::Closed => {
                self.push_outcome(success);
                if self.should_trip() {
                    self.trip(now);
                }
            }
            CircuitState::Open => {
                if success {
                    self.state = CircuitState::HalfOpen;
                } else {
                    self.trip(now);
                }
            }
        }
    }

    fn push_outcome(&mut self, success: bool) {
        if self.outcomes.len() == self.config.window_size {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    fn should_trip(&self) -> bool {
        let min_calls = self.config.min_calls.clamp(1, self.config.window_size.max(1));
        if self.outcomes.len() < min_calls {
            return false;
        }
        let failures = self.outcomes.iter().filter(|outcome| !**outcome).count();
        let rate = failures as f64 / self.outcomes.len() as f64;
        rate > self.config.failure_threshold
    }

    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.open_until = Some(now + self.config.open_for);
    }
}

/// Chat client shared by the planner, the judge and the metadata extractor.
///
/// Every call runs under a deadline; failures and timeouts feed a sliding
/// window breaker that suspends calls once the failure rate crosses the
/// configured threshold.
pub struct LlmClient {
    backend: Arc<dyn ChatBackend>,
    model: String,
    temperature: Option<f32>,
    deadline: Duration,
    breaker: Mutex<CircuitBreaker>,
}

impl LlmClient {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>, deadline: Duration) -> Self {
        Self {
            backend,
            model: model.into(),
            temperature: None,
            deadline,
            breaker: Mutex::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
        }
    }

    pub fn with_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = Mutex::new(CircuitBreaker::new(config));
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn with_breaker_state<T>(&self, f: impl FnOnce(&mut CircuitBreaker) -> T) -> T {
        let mut guard = self
            .breaker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub async fn chat(&self, system: &str, user: &str) -> LlmResult<String> {
        let now = Instant::now();
        if let CircuitDecision::ShortCircuit =
            self.with_breaker_state(|breaker| breaker.before_call(now))
        {
            warn!(target: "llm", model = %self.model, "circuit open, skipping call");
            return Err(LlmError::CircuitOpen);
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: self.temperature,
        };

        match timeout(self.deadline, self.backend.complete(request)).await {
            Ok(Ok(reply)) => {
                self.with_breaker_state(|breaker| breaker.record(now, true));
                debug!(
                    target: "llm",
                    model = %reply.model,
                    elapsed_ms = now.elapsed().as_millis() as u64,
                    "chat completed"
                );
                Ok(reply.content)
            }
            Ok(Err(err)) => {
                warn!(target: "llm", model = %self.model, "backend error: {err}");
                self.with_breaker_state(|breaker| breaker.record(now, false));
                Err(err)
            }
            Err(_) => {
                warn!(target: "llm", model = %self.model, "timeout after {:?}", self.deadline);
                self.with_breaker_state(|breaker| breaker.record(now, false));
                Err(LlmError::Timeout(self.deadline))
            }
        }
    }
}

/// Strips a surrounding markdown code fence (```json ... ```) from a reply.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}
