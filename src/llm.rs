use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::config::{GeminiConfig, FALLBACK_GEMINI_MODEL};
use crate::prompt::build_prompt;
use crate::summary::{parse_summary, SummaryResult};
use crate::warehouse::ReleaseNote;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SummaryError {
    #[error("Summary generation is not configured: {0}")]
    NotConfigured(String),

    #[error("Generative API rejected the credentials: {0}")]
    Auth(String),

    #[error("Generative model '{0}' was not found")]
    ModelNotFound(String),

    #[error("Network error calling generative API: {0}")]
    Network(String),

    #[error("Generative API request timed out")]
    Timeout,

    #[error("Generative API returned no text")]
    EmptyResponse,

    #[error("Generative API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl SummaryError {
    /// Short description suitable for the dashboard.
    pub fn user_message(&self) -> &'static str {
        match self {
            SummaryError::NotConfigured(_) => "AI summary is not configured on this server",
            SummaryError::Auth(_) => "AI summary failed: the API key was rejected",
            SummaryError::ModelNotFound(_) => "AI summary failed: the configured model is unavailable",
            SummaryError::Network(_) => "AI summary failed: could not reach the AI service",
            SummaryError::Timeout => "AI summary failed: the AI service took too long to respond",
            SummaryError::EmptyResponse => "AI summary failed: the AI service returned an empty response",
            SummaryError::Api { .. } => "AI summary failed",
        }
    }
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

/// Thin client for the `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(endpoint: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub async fn generate_content(&self, api_key: &str, model: &str, prompt: &str) -> Result<String, SummaryError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt.into() }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                top_p: 0.8,
                top_k: 40,
                max_output_tokens: 2048,
            },
        };

        let url = format!("{}/models/{}:generateContent", self.endpoint, model);
        let res = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(status_error(status, &text, model));
        }

        let json: serde_json::Value = res.json().await.map_err(|err| body_error(status, err))?;
        let reply: String = json["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
            .unwrap_or_default();

        if reply.trim().is_empty() {
            return Err(SummaryError::EmptyResponse);
        }

        Ok(reply)
    }
}

fn transport_error(err: reqwest::Error) -> SummaryError {
    if err.is_timeout() {
        SummaryError::Timeout
    } else {
        // the URL carries the API key
        SummaryError::Network(err.without_url().to_string())
    }
}

/// A 2xx reply whose body cannot be read as JSON is an upstream fault, not a
/// connectivity problem.
fn body_error(status: StatusCode, err: reqwest::Error) -> SummaryError {
    if err.is_decode() {
        SummaryError::Api {
            status: status.as_u16(),
            message: format!("invalid response body: {}", err.without_url()),
        }
    } else {
        transport_error(err)
    }
}

fn status_error(status: StatusCode, body: &str, model: &str) -> SummaryError {
    let parsed: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let message = parsed["error"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SummaryError::Auth(message),
        StatusCode::BAD_REQUEST if is_invalid_key(&parsed, &message) => SummaryError::Auth(message),
        StatusCode::NOT_FOUND => SummaryError::ModelNotFound(model.to_string()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => SummaryError::Timeout,
        _ => SummaryError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn is_invalid_key(parsed: &serde_json::Value, message: &str) -> bool {
    let reasons = parsed["error"]["details"]
        .as_array()
        .map(|details| details.iter().any(|d| d["reason"] == "API_KEY_INVALID"))
        .unwrap_or(false);
    reasons || message.contains("API key not valid")
}

/// Produces summaries for batches of release notes.
#[derive(Clone)]
pub struct SummaryGenerator {
    client: GeminiClient,
    config: GeminiConfig,
}

impl SummaryGenerator {
    pub fn new(client: GeminiClient, config: GeminiConfig) -> Self {
        Self { client, config }
    }

    pub fn from_config(config: &GeminiConfig) -> reqwest::Result<Self> {
        let client = GeminiClient::new(&config.endpoint, config.timeout)?;
        Ok(Self::new(client, config.clone()))
    }

    /// Returns `Ok(None)` for an empty batch without calling the API.
    pub async fn summarize(&self, notes: &[ReleaseNote]) -> Result<Option<SummaryResult>, SummaryError> {
        if notes.is_empty() {
            return Ok(None);
        }

        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| SummaryError::NotConfigured("GEMINI_API_KEY is not set".to_string()))?;

        let prompt = build_prompt(notes);
        let model = &self.config.model;
        tracing::info!(model = model.name(), notes = notes.len(), prompt_chars = prompt.len(), "requesting summary");

        let started = std::time::Instant::now();
        let text = match self.client.generate_content(api_key, model.name(), &prompt).await {
            Ok(text) => text,
            Err(err) if model.is_experimental() => {
                tracing::warn!(
                    model = model.name(),
                    fallback = FALLBACK_GEMINI_MODEL,
                    error = %err,
                    "experimental model failed, retrying with fallback"
                );
                self.client.generate_content(api_key, FALLBACK_GEMINI_MODEL, &prompt).await?
            }
            Err(err) => return Err(err),
        };

        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, reply_chars = text.len(), "summary generated");
        Ok(Some(parse_summary(&text)))
    }
}
