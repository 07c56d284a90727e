use crate::analyzer::llm_client::{AnalysisBackend, BackendFuture, BackendKind, ChatCompletionClient};
use crate::error::BackendError;
use crate::models::AnalysisRequest;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// LM Studio ignores the key but OpenAI-compatible servers expect one.
pub const DEFAULT_API_KEY: &str = "lm-studio";
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub model_name: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub temperature: f32,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model_name: model_name.into(),
            api_key: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: 1000,
            temperature: 0.2,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = backoff_ms;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("Backend URL must start with http:// or https://: {}", url));
        }
        if self.model_name.trim().is_empty() {
            return Err("Remote model name cannot be empty".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Worst case for one request: every attempt runs to its timeout and
    /// every backoff is slept.
    pub fn call_budget(&self) -> Duration {
        let attempts = u64::from(self.max_retries) + 1;
        let retries = u64::from(self.max_retries);
        let backoff_ms = self.retry_backoff_ms * retries * (retries + 1) / 2;
        Duration::from_secs(self.timeout_seconds * attempts) + Duration::from_millis(backoff_ms)
    }
}

/// OpenAI-compatible HTTP endpoint. Calls are stateless, so they may overlap.
pub struct RemoteBackend {
    config: RemoteConfig,
    client: ChatCompletionClient,
}

impl RemoteBackend {
    pub fn new(config: RemoteConfig) -> Result<Self, BackendError> {
        config.validate().map_err(BackendError::InitFailed)?;

        let api_key = config
            .api_key
            .clone()
            .unwrap_or_else(|| DEFAULT_API_KEY.to_string());
        let client = ChatCompletionClient::new(
            &config.base_url,
            &config.model_name,
            Some(api_key),
            config.timeout_seconds,
        )?
        .with_temperature(config.temperature);

        Ok(Self { config, client })
    }

    async fn analyze_with_retry(&self, request: &AnalysisRequest) -> Result<String, BackendError> {
        let max_attempts = self.config.max_retries + 1;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let backoff = self.config.retry_backoff_ms * (attempt as u64 - 1);
                debug!(
                    "Retrying {} (attempt {}/{}) in {}ms",
                    request.script_id, attempt, max_attempts, backoff
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            match self.client.complete(request).await {
                Ok(text) => return Ok(text),
                Err(e) if is_transient(&e) => {
                    warn!("Transient backend error for {}: {}", request.script_id, e);
                    last_error = Some(e);
                }
                // Auth, 4xx, timeouts and bad bodies will not improve on retry.
                Err(e) => return Err(e),
            }
        }

        Err(match last_error {
            Some(BackendError::Unreachable { message, .. }) => BackendError::Unreachable {
                attempts: max_attempts,
                message,
            },
            Some(other) => other,
            None => BackendError::Unreachable {
                attempts: max_attempts,
                message: "no attempt was made".to_string(),
            },
        })
    }
}

fn is_transient(error: &BackendError) -> bool {
    match error {
        BackendError::Unreachable { .. } => true,
        BackendError::Rejected { status, .. } => *status >= 500,
        _ => false,
    }
}

impl AnalysisBackend for RemoteBackend {
    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> BackendFuture<'a, Result<String, BackendError>> {
        Box::pin(self.analyze_with_retry(request))
    }

    fn get_model_name(&self) -> &str {
        &self.config.model_name
    }

    fn get_timeout(&self) -> Duration {
        // Each attempt is bounded by the HTTP client; this covers the retries.
        self.config.call_budget()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }
}
