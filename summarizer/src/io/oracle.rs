//! Oracle abstraction for text generation.
//!
//! The [`Oracle`] trait decouples orchestration from the inference backend
//! (currently any OpenAI-compatible chat-completions server such as LM Studio
//! or Ollama). Tests use scripted oracles that return predetermined replies.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::budget::SessionBudget;
use crate::core::reasoning::{ReasoningTags, answer_segment};
use crate::error::GenerationServiceError;
use crate::io::config::OracleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// Usually a `data:<mime>;base64,<payload>` URL.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message carrying an instruction plus one inline image.
    pub fn user_with_image(text: impl Into<String>, mime: &str, base64_payload: &str) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{mime};base64,{base64_payload}"),
                    },
                },
            ]),
        }
    }

    /// Concatenated text parts (images omitted).
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Abstraction over text generation backends.
pub trait Oracle {
    /// Return the raw completion for `messages`, reasoning segment included.
    fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        (**self).generate(messages)
    }
}

/// Call the oracle within the session budget and return only the answer
/// segment (reasoning stripped, trimmed).
#[instrument(skip_all, fields(messages = messages.len()))]
pub fn ask<O: Oracle + ?Sized>(
    oracle: &O,
    messages: &[ChatMessage],
    tags: &ReasoningTags,
    budget: &SessionBudget,
) -> Result<String> {
    budget.remaining()?;
    let raw = oracle.generate(messages)?;
    let answer = answer_segment(&raw, tags);
    debug!(raw_len = raw.len(), answer_len = answer.len(), "oracle replied");
    Ok(answer.to_string())
}

/// Oracle backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsOracle {
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| GenerationServiceError {
                message: format!("build http client: {err}"),
            })?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Oracle for ChatCompletionsOracle {
    #[instrument(skip_all, fields(model = %self.model, timeout_secs = self.timeout.as_secs()))]
    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|err| {
                let message = if err.is_connect() {
                    format!("cannot connect to {}", self.endpoint)
                } else if err.is_timeout() {
                    format!("request timed out after {}s", self.timeout.as_secs())
                } else {
                    err.to_string()
                };
                warn!(%message, "oracle request failed");
                GenerationServiceError { message }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), "oracle returned error status");
            return Err(GenerationServiceError {
                message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            }
            .into());
        }

        let parsed: ChatCompletionResponse = response.json().map_err(|err| GenerationServiceError {
            message: format!("parse completion response: {err}"),
        })?;
        parse_completion(parsed)
    }
}

fn parse_completion(parsed: ChatCompletionResponse) -> Result<String> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            GenerationServiceError {
                message: "completion response has no message content".to_string(),
            }
            .into()
        })
}
