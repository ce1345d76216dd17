use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::config::AiConfig;

#[derive(Debug, Clone, Error)]
pub enum AiError {
    #[error("AI service is not configured")]
    NotConfigured,
    #[error("AI provider request timed out")]
    Timeout,
    #[error("AI provider error: {0}")]
    Transport(String),
}

/// Narrow boundary to the language-model provider: one prompt in, raw text out.
/// Parsing and fallback policy live with the caller.
#[async_trait]
pub trait FeedbackProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: String,
}

impl GeminiClient {
    pub fn new(config: &AiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl FeedbackProvider for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let api_key = self.api_key.as_deref().ok_or(AiError::NotConfigured)?;
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );

        let resp = self
            .client
            .post(&url)
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::Transport(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(AiError::Transport(format!(
                "provider returned {}",
                resp.status()
            )));
        }

        let body: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| AiError::Transport(e.to_string()))?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| AiError::Transport("empty completion".into()))?;

        debug!(chars = text.len(), model = %self.model, "feedback completion received");
        Ok(text)
    }
}
