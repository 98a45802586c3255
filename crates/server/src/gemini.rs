//! `generateContent` client for the Gemini API.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use miled_agent::{CompletionRequest, LlmClient};
use miled_core::{Message, Role};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const RETRY_BACKOFF_MS: u64 = 200;

pub struct GeminiClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(
        api_key: SecretString,
        base_url: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building Gemini HTTP client")?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    async fn send_once(&self, url: &str, body: &GenerateContentRequest<'_>) -> Attempt {
        let response = match self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => return Attempt::Retryable(anyhow!("Gemini request failed: {error}")),
        };

        let status = response.status();
        let raw_body = match response.text().await {
            Ok(raw_body) => raw_body,
            Err(error) => return Attempt::Retryable(anyhow!("reading Gemini response failed: {error}")),
        };

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retryable(anyhow!("Gemini API error {status}"));
        }
        if !status.is_success() {
            return Attempt::Fatal(anyhow!("Gemini API error {status}: {}", truncate(&raw_body)));
        }

        match serde_json::from_str::<GenerateContentResponse>(&raw_body) {
            Ok(parsed) => Attempt::Done(parsed.first_text()),
            Err(error) => Attempt::Fatal(anyhow!("failed to parse Gemini response: {error}")),
        }
    }
}

enum Attempt {
    Done(String),
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let url = self.endpoint(&request.model);
        let body = GenerateContentRequest::from_completion(&request);

        let mut attempt = 0;
        loop {
            debug!(
                event_name = "llm.gemini.request",
                model = %request.model,
                messages_count = request.messages.len(),
                attempt,
                "calling Gemini API"
            );
            match self.send_once(&url, &body).await {
                Attempt::Done(text) => return Ok(text),
                Attempt::Fatal(error) => return Err(error),
                Attempt::Retryable(error) if attempt < self.max_retries => {
                    warn!(
                        event_name = "llm.gemini.retry",
                        model = %request.model,
                        attempt,
                        error = %error,
                        "retrying Gemini call"
                    );
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt)))
                        .await;
                }
                Attempt::Retryable(error) => bail!("{error} (after {} attempts)", attempt + 1),
            }
        }
    }
}

fn truncate(raw: &str) -> String {
    raw.chars().take(500).collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    /// Only thinking-tier models accept a thinking budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: i32,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_completion(request: &'a CompletionRequest) -> Self {
        let system_parts: Vec<Part<'a>> = request
            .messages
            .iter()
            .filter(|message| message.role == Role::System)
            .map(|message| Part { text: &message.content })
            .collect();

        let contents = request
            .messages
            .iter()
            .filter(|message| message.role != Role::System)
            .map(content_for)
            .collect();

        Self {
            system_instruction: (!system_parts.is_empty())
                .then_some(Content { role: None, parts: system_parts }),
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
                thinking_config: request
                    .tier
                    .is_thinking()
                    .then_some(ThinkingConfig { thinking_budget: request.thinking_budget }),
            },
        }
    }
}

fn content_for(message: &Message) -> Content<'_> {
    let role = match message.role {
        Role::Assistant => "model",
        Role::User | Role::System => "user",
    };
    Content { role: Some(role), parts: vec![Part { text: &message.content }] }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// First candidate's first part, empty when there is none.
    fn first_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .unwrap_or_default()
    }
}
