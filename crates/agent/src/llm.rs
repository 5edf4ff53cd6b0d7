//! OpenAI-compatible chat completion client.
//!
//! Transport-level retries (connect failures, 408/429/5xx) live here and are
//! independent of the generator's attempt loop: a request that exhausts this
//! policy surfaces as [`AgentError::Llm`], which the generator treats as
//! fatal.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::config::OpenAiConfig;
use crate::error::AgentError;

/// A chat model that answers a system + user message pair with JSON text.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String, AgentError>;

    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum QueryError {
    Http {
        status: StatusCode,
        body: String,
        retry_after: Option<Duration>,
    },
    Transport {
        is_connect: bool,
        message: String,
    },
    InvalidJson {
        body: String,
        parse_error: String,
    },
}

impl From<QueryError> for AgentError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Http { status, body, .. } => {
                AgentError::Llm(format!("HTTP {status} with body: {body}"))
            }
            QueryError::Transport { message, .. } => AgentError::Llm(message),
            QueryError::InvalidJson { body, parse_error } => AgentError::Llm(format!(
                "Invalid JSON in success response: {parse_error}; raw body: {body}"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub(crate) fn is_retryable(&self, err: &QueryError) -> bool {
        match err {
            QueryError::Transport { is_connect, .. } => *is_connect,
            QueryError::Http { status, .. } => {
                matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
            }
            // A 2xx with a broken body already cost an inference.
            QueryError::InvalidJson { .. } => false,
        }
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(10);
        let base = self.base_delay.saturating_mul(1u32 << shift);
        base.min(self.max_delay) + jitter(self.base_delay)
    }
}

fn jitter(base: Duration) -> Duration {
    let half = base.as_nanos() / 2;
    if half == 0 {
        return Duration::ZERO;
    }
    let nanos_now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u128::from(d.subsec_nanos()))
        .unwrap_or(0);
    Duration::from_nanos((nanos_now % half) as u64)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    policy: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn build_request_body(&self, system: &str, user: &str) -> Value {
        json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        })
    }

    async fn query_once(&self, body: &Value) -> Result<Value, QueryError> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| QueryError::Transport {
                is_connect: e.is_connect(),
                message: censor_api_key(&e.to_string(), &self.api_key),
            })?;

        handle_response_to_json(resp, &self.api_key).await
    }

    async fn query_with_retries(&self, body: &Value) -> Result<Value, AgentError> {
        let mut attempt: u32 = 1;
        loop {
            match self.query_once(body).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt >= self.policy.max_attempts || !self.policy.is_retryable(&e) {
                        return Err(e.into());
                    }
                    let mut delay = self.policy.backoff_delay(attempt);
                    if let QueryError::Http {
                        retry_after: Some(ra),
                        ..
                    } = e
                    {
                        delay = delay.max(ra);
                    }
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "LLM request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String, AgentError> {
        let body = self.build_request_body(system, user);
        tracing::debug!(
            model = %self.model,
            system_len = system.len(),
            user_len = user.len(),
            "Sending chat completion request",
        );
        let response = self.query_with_retries(&body).await?;
        let text = extract_text_from_response(&response)?;
        tracing::debug!(response_len = text.len(), "Received chat completion");
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Replace the API key in `text` with its last four characters.
pub(crate) fn censor_api_key(text: &str, api_key: &str) -> String {
    if api_key.is_empty() {
        return text.to_string();
    }
    let censored = if api_key.len() > 8 {
        format!("...{}", &api_key[api_key.len() - 4..])
    } else {
        "...".to_string()
    };
    text.replace(api_key, &censored)
}

async fn handle_response_to_json(resp: reqwest::Response, api_key: &str) -> Result<Value, QueryError> {
    let status = resp.status();
    let retry_after = parse_retry_after(resp.headers());

    let text = resp.text().await.map_err(|e| QueryError::Transport {
        is_connect: e.is_connect(),
        message: censor_api_key(&e.to_string(), api_key),
    })?;

    if !status.is_success() {
        return Err(QueryError::Http {
            status,
            body: censor_api_key(&text, api_key),
            retry_after,
        });
    }

    serde_json::from_str::<Value>(&text).map_err(|e| QueryError::InvalidJson {
        body: text,
        parse_error: e.to_string(),
    })
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub(crate) fn extract_text_from_response(response: &Value) -> Result<String, AgentError> {
    response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AgentError::Llm("Could not find 'content' in chat completion response".into()))
}
