use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use textsql_core::config::{LlmConfig, LlmProvider};
use thiserror::Error;
use tracing::warn;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm service unavailable: {0}")]
    Unavailable(String),
    #[error("llm rate limit reached: {0}")]
    RateLimited(String),
    #[error("llm rejected credentials: {0}")]
    Auth(String),
    #[error("llm request timed out")]
    Timeout,
    #[error("llm returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited(_) | Self::Timeout)
    }
}

/// Opaque text completion with a system/user prompt contract.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        (**self).complete(system_prompt, user_prompt).await
    }
}

pub struct HttpLlmClient {
    provider: LlmProvider,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    fallback_model: Option<String>,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| LlmError::Unavailable(format!("http client: {error}")))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url: normalize_base_url(&base_url),
            model: config.model.clone(),
            fallback_model: config.fallback_model.clone(),
            max_retries: config.max_retries,
            client,
        })
    }

    pub fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Ollama => format!("{}/v1/chat/completions", self.base_url),
            LlmProvider::Anthropic => format!("{}/v1/messages", self.base_url),
        }
    }

    async fn call_model(&self, model: &str, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let body = request_body(self.provider, model, system_prompt, user_prompt);
        let mut request = self.client.post(self.endpoint()).json(&body);

        match self.provider {
            LlmProvider::Anthropic => {
                if let Some(api_key) = &self.api_key {
                    request = request.header("x-api-key", api_key.expose_secret());
                }
                request = request.header("anthropic-version", "2023-06-01");
            }
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                if let Some(api_key) = &self.api_key {
                    request = request.bearer_auth(api_key.expose_secret());
                }
            }
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Unavailable(format!("{}: {error}", self.provider.as_str()))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, &detail));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| LlmError::InvalidResponse(format!("body is not json: {error}")))?;
        parse_response(self.provider, &payload)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        complete_with_fallback(
            &self.model,
            self.fallback_model.as_deref(),
            self.max_retries,
            Duration::from_millis(250),
            |model| async move { self.call_model(&model, system_prompt, user_prompt).await },
        )
        .await
    }
}

/// Retries transient failures on `primary`, then tries `fallback` once.
pub async fn complete_with_fallback<F, Fut>(
    primary: &str,
    fallback: Option<&str>,
    max_retries: u32,
    backoff: Duration,
    mut call: F,
) -> Result<String, LlmError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String, LlmError>>,
{
    let mut attempt = 0;
    let last_error = loop {
        match call(primary.to_string()).await {
            Ok(text) => return Ok(text),
            Err(error) if error.is_transient() && attempt < max_retries => {
                attempt += 1;
                warn!(
                    event_name = "llm.request.retry",
                    model = primary,
                    attempt,
                    error = %error,
                    "transient llm failure, retrying"
                );
                tokio::time::sleep(backoff * 2u32.saturating_pow(attempt - 1)).await;
            }
            Err(error) => break error,
        }
    };

    match fallback.filter(|model| *model != primary) {
        Some(model) => {
            warn!(
                event_name = "llm.request.fallback",
                model = primary,
                fallback_model = model,
                error = %last_error,
                "primary model failed, trying fallback model"
            );
            call(model.to_string()).await
        }
        None => Err(last_error),
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string()
}

fn request_body(provider: LlmProvider, model: &str, system_prompt: &str, user_prompt: &str) -> Value {
    match provider {
        LlmProvider::Anthropic => json!({
            "model": model,
            "max_tokens": 1024,
            "temperature": 0.0,
            "system": system_prompt,
            "messages": [{"role": "user", "content": user_prompt}],
        }),
        LlmProvider::OpenAi | LlmProvider::Ollama => json!({
            "model": model,
            "temperature": 0.0,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        }),
    }
}

fn status_error(status: StatusCode, detail: &str) -> LlmError {
    let detail: String = detail.chars().take(200).collect();
    let message = format!("status {}: {detail}", status.as_u16());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => LlmError::Timeout,
        status if status.is_server_error() => LlmError::Unavailable(message),
        _ => LlmError::InvalidResponse(message),
    }
}

pub fn parse_response(provider: LlmProvider, payload: &Value) -> Result<String, LlmError> {
    let pointer = match provider {
        LlmProvider::Anthropic => "/content/0/text",
        LlmProvider::OpenAi | LlmProvider::Ollama => "/choices/0/message/content",
    };
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| LlmError::InvalidResponse(format!("missing {pointer}")))
}
