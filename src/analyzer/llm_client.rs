use crate::analyzer::local_runtime::{LocalBackend, LocalRuntimeConfig};
use crate::analyzer::remote::{RemoteBackend, RemoteConfig};
use crate::cancellation::CancellationSignal;
use crate::error::BackendError;
use crate::models::AnalysisRequest;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Local,
    Remote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        }
    }
}

/// One analysis engine for a whole run. Implementations return the model's
/// raw text; interpreting it is the verdict parser's job.
pub trait AnalysisBackend: Send + Sync {
    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> BackendFuture<'a, Result<String, BackendError>>;

    fn get_model_name(&self) -> &str;

    /// Upper bound on one `analyze` call, retries included.
    fn get_timeout(&self) -> Duration;

    fn kind(&self) -> BackendKind;

    /// Upper bound on calls worth having in flight at once.
    fn max_concurrency(&self) -> usize {
        usize::MAX
    }

    /// Releases runtime resources. Called once at the end of a run.
    fn shutdown<'a>(&'a self) -> BackendFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// Run-level backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BackendConfig {
    Local(LocalRuntimeConfig),
    Remote(RemoteConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Local(_) => BackendKind::Local,
            BackendConfig::Remote(_) => BackendKind::Remote,
        }
    }

    pub fn label(&self) -> String {
        match self {
            BackendConfig::Local(config) => format!("local llama.cpp ({})", config.model.label()),
            BackendConfig::Remote(config) => {
                format!("remote {} @ {}", config.model_name, config.base_url)
            }
        }
    }

    pub fn timeout_seconds(&self) -> u64 {
        match self {
            BackendConfig::Local(config) => config.timeout_seconds,
            BackendConfig::Remote(config) => config.timeout_seconds,
        }
    }
}

pub async fn create_backend(
    config: &BackendConfig,
    cancel: &CancellationSignal,
) -> Result<Box<dyn AnalysisBackend>, BackendError> {
    match config {
        BackendConfig::Local(local) => Ok(Box::new(LocalBackend::start(local.clone(), cancel).await?)),
        BackendConfig::Remote(remote) => Ok(Box::new(RemoteBackend::new(remote.clone())?)),
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Single-attempt client for the OpenAI-compatible `/chat/completions` route,
/// shared by both backends.
pub struct ChatCompletionClient {
    http: reqwest::Client,
    endpoint: String,
    model_name: String,
    api_key: Option<String>,
    temperature: f32,
    timeout_seconds: u64,
}

impl ChatCompletionClient {
    pub fn new(
        base_url: &str,
        model_name: &str,
        api_key: Option<String>,
        timeout_seconds: u64,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("blendscan/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| BackendError::InitFailed(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: completions_url(base_url),
            model_name: model_name.to_string(),
            api_key,
            temperature: 0.2,
            timeout_seconds,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub async fn complete(&self, request: &AnalysisRequest) -> Result<String, BackendError> {
        let body = ChatCompletionRequest {
            model: &self.model_name,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        debug!(
            "POST {} for {} ({} prompt bytes)",
            self.endpoint,
            request.script_id,
            request.prompt_size()
        );

        let mut builder = self.http.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, self.timeout_seconds))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e, self.timeout_seconds))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(BackendError::AuthFailed {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message: snippet(&text, 300),
            });
        }

        extract_completion_text(&text)
    }
}

pub fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Pulls generated text out of a chat-completions (or legacy completions) body.
pub fn extract_completion_text(body: &str) -> Result<String, BackendError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        BackendError::InvalidResponse(format!("body is not JSON ({}): {}", e, snippet(body, 120)))
    })?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::InvalidResponse("response has no choices".to_string()))?;

    choice
        .message
        .and_then(|m| m.content)
        .or(choice.text)
        .ok_or_else(|| BackendError::InvalidResponse("choice carries no generated text".to_string()))
}

fn classify_transport_error(error: &reqwest::Error, timeout_seconds: u64) -> BackendError {
    if error.is_timeout() {
        BackendError::Timeout {
            timeout: timeout_seconds,
        }
    } else {
        BackendError::Unreachable {
            attempts: 1,
            message: error.to_string(),
        }
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
