//! OpenAI-compatible chat-completions client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::infra::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

use super::{CompletionOracle, CompletionRequest, OracleError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Longest error body kept in an [`OracleError::Status`].
const MAX_ERROR_BODY: usize = 2048;

/// Oracle connection settings
#[derive(Clone)]
pub struct OracleConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Whole-call timeout; expiry is reported as unavailability
    pub timeout: Duration,
}

impl std::fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OracleConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the oracle settings from the environment.
    ///
    /// Returns `None` when no API key is set, meaning the oracle is
    /// unconfigured.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_blank("ORACLE_API_KEY").or_else(|| non_blank("OPENAI_API_KEY"))?;
        let mut config = Self::new(api_key);
        if let Some(base_url) = non_blank("ORACLE_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(model) = non_blank("ORACLE_MODEL") {
            config.model = model;
        }
        if let Some(secs) = non_blank("ORACLE_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if secs > 0 {
                config.timeout = Duration::from_secs(secs);
            }
        }
        Some(config)
    }
}

/// Chat-completions oracle over HTTP, guarded by a circuit breaker.
pub struct HttpOracle {
    client: reqwest::Client,
    config: OracleConfig,
    breaker: CircuitBreaker,
}

impl std::fmt::Debug for HttpOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOracle")
            .field("config", &self.config)
            .finish()
    }
}

impl HttpOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        Self::with_breaker(config, CircuitBreakerConfig::default())
    }

    pub fn with_breaker(
        config: OracleConfig,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, OracleError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| OracleError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            breaker: CircuitBreaker::new("oracle", breaker),
        })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String, OracleError> {
        let mut trace_headers = HeaderMap::new();
        crate::telemetry::inject_current_context(&mut trace_headers);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .headers(trace_headers)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let envelope: Value = serde_json::from_str(&body)
            .map_err(|e| OracleError::MalformedResponse(format!("invalid JSON envelope: {e}")))?;

        extract_message_content(&envelope).ok_or_else(|| {
            OracleError::MalformedResponse("missing choices[0].message.content".to_string())
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> OracleError {
        if error.is_timeout() {
            OracleError::Unavailable(format!("timed out after {:?}", self.config.timeout))
        } else {
            OracleError::Unavailable(error.to_string())
        }
    }
}

#[async_trait]
impl CompletionOracle for HttpOracle {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError> {
        let result = self
            .breaker
            .guard(self.send(&request), OracleError::indicates_outage)
            .await;

        match result {
            Ok(content) => {
                debug!(chars = content.len(), "Oracle completion received");
                Ok(content)
            }
            Err(CircuitBreakerError::Rejected) => Err(OracleError::Unavailable(
                "circuit breaker is open".to_string(),
            )),
            Err(CircuitBreakerError::Inner(e)) => Err(e),
        }
    }

    async fn circuit_state(&self) -> Option<CircuitState> {
        Some(self.breaker.state())
    }
}

/// Pull `choices[0].message.content` out of a chat-completions envelope.
pub fn extract_message_content(envelope: &Value) -> Option<String> {
    envelope
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

fn truncate(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}
