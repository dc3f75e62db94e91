//! Text-generation capability used by the model-based parser.

use crate::config::ProviderConfig;
use crate::{bounded, Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a strict JSON generator for browser test automation. \
Output ONLY valid JSON, no markdown, no explanations.";

/// Given a prompt, return the model's text. Fallible and time-bounded.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint
/// (Groq, OpenAI, Ollama, vLLM, ...).
pub struct ChatClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl ChatClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout_ms: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            temperature: 0.0,
        })
    }

    /// Build from a provider entry, resolving its API key now.
    pub fn from_config(provider: &ProviderConfig, timeout_ms: u64) -> Result<Self> {
        let mut client = Self::new(
            &provider.endpoint,
            &provider.model,
            provider.resolve_api_key(),
            timeout_ms,
        )?;
        client.temperature = provider.temperature;
        Ok(client)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        debug!("model request: {} ({} chars)", self.model, prompt.len());
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let excerpt: String = text.chars().take(200).collect();
            return Err(Error::Model(format!(
                "{} returned {}: {}",
                self.model, status, excerpt
            )));
        }

        let value: Value = resp.json().await?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Model(format!("{}: response has no message content", self.model)))
    }
}

/// Tries each generator in order; the first success wins.
///
/// With a per-call bound set, a hung provider costs at most that bound
/// before the next one is tried.
pub struct FallbackGenerator {
    generators: Vec<(String, Arc<dyn TextGenerator>)>,
    per_call_ms: Option<u64>,
}

impl FallbackGenerator {
    pub fn new() -> Self {
        Self {
            generators: Vec::new(),
            per_call_ms: None,
        }
    }

    /// Bound each provider call to `ms`.
    pub fn with_timeout(mut self, ms: u64) -> Self {
        self.per_call_ms = Some(ms);
        self
    }

    /// Worst-case time for one `generate`: every provider timing out.
    pub fn budget_ms(&self) -> Option<u64> {
        self.per_call_ms
            .map(|ms| ms.saturating_mul(self.generators.len().max(1) as u64))
    }

    pub fn with(mut self, name: impl Into<String>, generator: Arc<dyn TextGenerator>) -> Self {
        self.generators.push((name.into(), generator));
        self
    }

    /// One [`ChatClient`] per configured provider, in config order.
    pub fn from_providers(providers: &[ProviderConfig], timeout_ms: u64) -> Result<Self> {
        let mut fallback = Self::new().with_timeout(timeout_ms);
        for p in providers {
            let client = ChatClient::from_config(p, timeout_ms)?;
            fallback = fallback.with(p.model.clone(), Arc::new(client));
        }
        Ok(fallback)
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for FallbackGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut failures = Vec::new();
        for (name, generator) in &self.generators {
            let call = generator.generate(prompt);
            let outcome = match self.per_call_ms {
                Some(ms) => bounded(ms, "model call", call).await,
                None => call.await,
            };
            match outcome {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("model '{}' failed: {}", name, e);
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }
        if failures.is_empty() {
            return Err(Error::Model("no model providers configured".into()));
        }
        Err(Error::Model(format!(
            "all providers failed ({})",
            failures.join("; ")
        )))
    }
}
