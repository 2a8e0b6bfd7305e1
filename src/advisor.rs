//! Advisory backends: one capability (`generate`), two providers with
//! similar but distinct request/response shapes, selected at construction
//! time so the recommendation engine stays provider-agnostic.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::types::Provider;
use crate::{Error, Result};

pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_CHATGPT_MODEL: &str = "gpt-4o-mini";

const CLAUDE_API_BASE: &str = "https://api.anthropic.com";
const OPENAI_API_BASE: &str = "https://api.openai.com";
const MAX_COMPLETION_TOKENS: u32 = 1024;

/// A black-box text-completion service.
#[async_trait]
pub trait AdvisoryModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

fn truncated(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}

pub struct ClaudeAdvisor {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ClaudeAdvisor {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: CLAUDE_API_BASE.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_CLAUDE_MODEL.to_string(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl AdvisoryModel for ClaudeAdvisor {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(url = %url, model = %self.model, "requesting advisory completion");

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Advisory(format!(
                "claude returned {status}: {}",
                truncated(&body)
            )));
        }

        let parsed: Value = resp.json().await?;
        parsed
            .pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Advisory("claude reply missing content text".to_string()))
    }
}

pub struct ChatGptAdvisor {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatGptAdvisor {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: OPENAI_API_BASE.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_CHATGPT_MODEL.to_string(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl AdvisoryModel for ChatGptAdvisor {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "requesting advisory completion");

        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Advisory(format!(
                "chatgpt returned {status}: {}",
                truncated(&body)
            )));
        }

        let parsed: Value = resp.json().await?;
        parsed
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Advisory("chatgpt reply missing message content".to_string()))
    }
}

/// Construct the advisor for the configured provider.
pub fn advisor_for(
    provider: Provider,
    api_key: &str,
    model: Option<&str>,
) -> Box<dyn AdvisoryModel> {
    match provider {
        Provider::Claude => {
            let mut advisor = ClaudeAdvisor::new(api_key);
            if let Some(m) = model {
                advisor = advisor.model(m);
            }
            Box::new(advisor)
        }
        Provider::ChatGpt => {
            let mut advisor = ChatGptAdvisor::new(api_key);
            if let Some(m) = model {
                advisor = advisor.model(m);
            }
            Box::new(advisor)
        }
    }
}
