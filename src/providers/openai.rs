/*!
 * OpenAI-compatible chat completions client.
 *
 * Serves as both AI collaborators: anchor discovery for sync (JSON mode,
 * low temperature) and batch translation (marker-tagged text).
 */

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::app_config::AiConfig;
use crate::errors::ProviderError;
use crate::language_utils;
use crate::providers::retry::{with_retry, RetryPolicy};
use crate::providers::{AnchorFinder, Translator};
use crate::sync::anchors::{build_anchor_prompt, parse_anchor_response};
use crate::sync::{AnchorLine, AnchorMatch};
use crate::translation::batch::{decode_batch, encode_batch};

/// Temperature for anchor matching; matching should be deterministic
const ANCHOR_TEMPERATURE: f32 = 0.1;

const ANCHOR_SYSTEM_PROMPT: &str = "You align subtitle tracks. Match lines that carry the same utterance, \
regardless of language. Respond with JSON only.";

/// OpenAI client
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: Client,
    retry: RetryPolicy,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// System prompt for one translation batch
fn translation_prompt(from_lang: &str, to_lang: &str) -> String {
    let from = language_utils::get_language_name(from_lang).unwrap_or_else(|_| from_lang.to_string());
    let to = language_utils::get_language_name(to_lang).unwrap_or_else(|_| to_lang.to_string());
    format!(
        "You are a professional subtitle translator. Translate each entry from {from} to {to}.\n\
         Each entry starts with a marker like <<ENTRY_0>>. Keep every marker exactly as given, \
         translate only the text after it, keep line breaks inside an entry, and end with <<END>>.\n\
         Do not merge, split, reorder or skip entries. Output nothing else."
    )
}

impl OpenAiClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            retry: RetryPolicy::new(config.retry_count, config.retry_backoff_ms),
        }
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("OpenAI API error ({}): {}", status, body.trim());
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("OpenAI response: {}", e)))
    }

    /// Send a chat request and return the first choice's content
    pub async fn complete(&self, messages: Vec<ChatMessage>, temperature: f32, json_mode: bool) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature,
            response_format: json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = with_retry(&self.retry, "OpenAI chat completion", || self.send_once(&request)).await?;
        if let Some(usage) = &response.usage {
            debug!(
                "OpenAI usage: {} prompt + {} completion tokens",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::ParseError("OpenAI response has no choices".to_string()))
    }
}

#[async_trait]
impl AnchorFinder for OpenAiClient {
    async fn find_anchors(&self, reference: &[AnchorLine], target: &[AnchorLine]) -> Result<Vec<AnchorMatch>, ProviderError> {
        let messages = vec![
            ChatMessage::system(ANCHOR_SYSTEM_PROMPT),
            ChatMessage::user(build_anchor_prompt(reference, target)),
        ];
        let content = self.complete(messages, ANCHOR_TEMPERATURE, true).await?;
        parse_anchor_response(&content)
    }

    fn name(&self) -> String {
        self.model.clone()
    }
}

#[async_trait]
impl Translator for OpenAiClient {
    async fn translate_batch(&self, lines: &[String], from_lang: &str, to_lang: &str) -> Result<Vec<String>, ProviderError> {
        let messages = vec![
            ChatMessage::system(translation_prompt(from_lang, to_lang)),
            ChatMessage::user(encode_batch(lines)),
        ];
        let content = self.complete(messages, self.temperature, false).await?;
        decode_batch(&content, lines.len())
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}
