//! LLM Gateway.
//!
//! Contract: deterministic at `temperature = 0` given the same prompt;
//! retries transient failures up to a bounded count with exponential
//! backoff; surfaces rate limiting as a distinct error kind. No caller
//! parses raw HTTP — callers receive either a `String` or a typed
//! [`EngineError`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Uniform request interface to a chat model.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String>;
}

/// HTTP-backed gateway to an OpenAI-compatible chat completion endpoint.
///
/// Grounded on `rust/agent-core/src/llm_client.rs`'s `LLMClient`: a thin
/// `reqwest::Client` wrapper with a configurable base URL and bounded
/// retries with exponential backoff on transient failures.
#[derive(Debug)]
pub struct HttpLlmGateway {
    client: Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl HttpLlmGateway {
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            max_retries: 3,
        })
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    async fn call_once(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            return Err(EngineError::RateLimit {
                retry_after_ms: 1000,
            });
        }
        if !response.status().is_success() {
            return Err(EngineError::Backend(format!(
                "provider returned status {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(EngineError::from)?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| EngineError::Parse("empty choices array".to_string()))
    }
}

#[async_trait]
impl LlmGateway for HttpLlmGateway {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.call_once(prompt, temperature, max_tokens).await {
                Ok(text) => return Ok(text),
                Err(EngineError::RateLimit { retry_after_ms }) if attempt < self.max_retries => {
                    let backoff = retry_after_ms * 2u64.pow(attempt);
                    let jitter = rand::rng().random_range(0..50);
                    warn!(attempt, backoff, "LLM gateway rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                    attempt += 1;
                }
                Err(EngineError::Backend(_)) if attempt < self.max_retries => {
                    let backoff = 200u64 * 2u64.pow(attempt);
                    warn!(attempt, backoff, "LLM gateway backend error, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Deterministic in-memory gateway for tests and offline exercising of the
/// tree logic. Responses are keyed by an exact-prompt lookup table with a
/// fallback default; calls are recorded for assertions.
#[derive(Debug, Default)]
pub struct StubLlmGateway {
    responses: HashMap<String, String>,
    default_response: String,
    calls: Mutex<Vec<(String, f32, u32)>>,
}

impl StubLlmGateway {
    #[must_use]
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            responses: HashMap::new(),
            default_response: default_response.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_response(mut self, prompt_contains: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.insert(prompt_contains.into(), response.into());
        self
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmGateway for StubLlmGateway {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), temperature, max_tokens));
        debug!(prompt_len = prompt.len(), temperature, "stub LLM call");
        for (needle, response) in &self.responses {
            if prompt.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }
        Ok(self.default_response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_gateway_matches_by_substring() {
        let gateway = StubLlmGateway::new("default").with_response("keyword", "matched");
        assert_eq!(
            gateway.generate("please extract keyword now", 0.0, 100).await.unwrap(),
            "matched"
        );
        assert_eq!(gateway.generate("unrelated", 0.0, 100).await.unwrap(), "default");
        assert_eq!(gateway.call_count(), 2);
    }
}
