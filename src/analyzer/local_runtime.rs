//! Local model backend: a `llama-server` child process hosting a quantized
//! GGUF model, started once per run and torn down at the end.
//!
//! The model context inside the server is a single shared resource, so every
//! request goes through one async mutex. Callers can submit concurrently; the
//! backend turns that into a queue.

use crate::analyzer::llm_client::{AnalysisBackend, BackendFuture, BackendKind, ChatCompletionClient};
use crate::cancellation::CancellationSignal;
use crate::error::BackendError;
use crate::extractor::config::resolve_executable;
use crate::models::AnalysisRequest;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_SERVER_PROGRAM: &str = "llama-server";
pub const DEFAULT_HF_MODEL: &str = "unsloth/Qwen3-4B-GGUF:Q4_K_M";
/// Completion cap for the bundled runtime, which otherwise generates until the context fills.
pub const DEFAULT_LOCAL_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocalModelSource {
    /// A GGUF file already on disk.
    Path(PathBuf),
    /// `repo:quant` fetched and cached by llama-server itself.
    HuggingFace(String),
}

impl LocalModelSource {
    pub fn label(&self) -> String {
        match self {
            LocalModelSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            LocalModelSource::HuggingFace(repo) => repo.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalRuntimeConfig {
    pub server_program: String,
    pub model: LocalModelSource,
    pub context_size: u32,
    pub gpu_layers: u32,
    pub threads: Option<usize>,
    pub startup_timeout_seconds: u64,
    pub timeout_seconds: u64,
    pub temperature: f32,
}

impl Default for LocalRuntimeConfig {
    fn default() -> Self {
        Self {
            server_program: DEFAULT_SERVER_PROGRAM.to_string(),
            model: LocalModelSource::HuggingFace(DEFAULT_HF_MODEL.to_string()),
            context_size: 4096,
            gpu_layers: 20,
            threads: None,
            // First use may include a model download.
            startup_timeout_seconds: 900,
            timeout_seconds: 180,
            temperature: 0.2,
        }
    }
}

impl LocalRuntimeConfig {
    pub fn with_server_program(mut self, program: impl Into<String>) -> Self {
        self.server_program = program.into();
        self
    }

    pub fn with_model(mut self, model: LocalModelSource) -> Self {
        self.model = model;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_startup_timeout(mut self, seconds: u64) -> Self {
        self.startup_timeout_seconds = seconds;
        self
    }

    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    pub fn build_server_args(&self, port: u16) -> Vec<String> {
        let mut args = match &self.model {
            LocalModelSource::Path(path) => vec!["-m".to_string(), path.to_string_lossy().into_owned()],
            LocalModelSource::HuggingFace(repo) => vec!["-hf".to_string(), repo.clone()],
        };
        args.extend([
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--port".to_string(),
            port.to_string(),
            "--ctx-size".to_string(),
            self.context_size.to_string(),
            "--n-gpu-layers".to_string(),
            self.gpu_layers.to_string(),
            "--threads".to_string(),
            self.thread_count().to_string(),
            "--parallel".to_string(),
            "1".to_string(),
        ]);
        args
    }
}

pub struct LocalBackend {
    config: LocalRuntimeConfig,
    client: ChatCompletionClient,
    model_label: String,
    server: Mutex<Option<Child>>,
    queue: Mutex<()>,
}

impl LocalBackend {
    /// Spawns llama-server and waits until the model is loaded. Cancelling
    /// `cancel` kills the half-started server and yields `Cancelled`.
    pub async fn start(config: LocalRuntimeConfig, cancel: &CancellationSignal) -> Result<Self, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let program = resolve_executable(&config.server_program).ok_or_else(|| {
            BackendError::InitFailed(format!("{} not found", config.server_program))
        })?;

        if let LocalModelSource::Path(ref path) = config.model {
            if !path.is_file() {
                return Err(BackendError::InitFailed(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
        }

        let port = free_local_port()?;
        let args = config.build_server_args(port);
        info!("Starting local model runtime: {} {:?}", program.display(), args);

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::InitFailed(format!("failed to spawn {}: {}", program.display(), e)))?;

        let base_url = format!("http://127.0.0.1:{}", port);
        let ready = tokio::select! {
            ready = wait_until_ready(&base_url, &mut child, config.startup_timeout_seconds) => ready,
            _ = cancel.cancelled() => {
                info!("Cancelled while the local model runtime was starting");
                Err(BackendError::Cancelled)
            }
        };
        if let Err(e) = ready {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(e);
        }

        info!("Local model runtime ready on port {}", port);
        Self::with_server(config, &base_url, child)
    }

    fn with_server(config: LocalRuntimeConfig, base_url: &str, child: Child) -> Result<Self, BackendError> {
        let model_label = config.model.label();
        let client = ChatCompletionClient::new(
            &format!("{}/v1", base_url.trim_end_matches('/')),
            &model_label,
            None,
            config.timeout_seconds,
        )?
        .with_temperature(config.temperature);

        Ok(Self {
            config,
            client,
            model_label,
            server: Mutex::new(Some(child)),
            queue: Mutex::new(()),
        })
    }

    async fn analyze_serialized(&self, request: &AnalysisRequest) -> Result<String, BackendError> {
        let _turn = self.queue.lock().await;
        debug!("Local runtime processing {}", request.script_id);
        self.client.complete(request).await
    }

    async fn stop(&self) {
        let mut server = self.server.lock().await;
        if let Some(mut child) = server.take() {
            info!("Stopping local model runtime");
            if let Err(e) = child.start_kill() {
                warn!("Could not stop llama-server: {}", e);
                return;
            }
            let _ = child.wait().await;
        }
    }
}

impl AnalysisBackend for LocalBackend {
    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> BackendFuture<'a, Result<String, BackendError>> {
        Box::pin(self.analyze_serialized(request))
    }

    fn get_model_name(&self) -> &str {
        &self.model_label
    }

    fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn max_concurrency(&self) -> usize {
        1
    }

    fn shutdown<'a>(&'a self) -> BackendFuture<'a, ()> {
        Box::pin(self.stop())
    }
}

fn free_local_port() -> Result<u16, BackendError> {
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .map_err(|e| BackendError::InitFailed(format!("no free local port: {}", e)))
}

async fn check_health(http: &reqwest::Client, base_url: &str) -> Result<(), String> {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let response = http.get(&url).send().await.map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("health returned HTTP {}", response.status().as_u16()))
    }
}

async fn wait_until_ready(
    base_url: &str,
    child: &mut Child,
    startup_timeout_seconds: u64,
) -> Result<(), BackendError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .map_err(|e| BackendError::InitFailed(format!("HTTP client: {}", e)))?;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(startup_timeout_seconds);

    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| BackendError::InitFailed(e.to_string()))?
        {
            return Err(BackendError::InitFailed(format!(
                "llama-server exited with {} before becoming ready",
                status
            )));
        }

        match check_health(&http, base_url).await {
            Ok(()) => return Ok(()),
            // 503 while the model loads, connection refused before the socket is up.
            Err(e) => debug!("Local runtime not ready yet: {}", e),
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(BackendError::InitFailed(format!(
                "llama-server not ready after {} seconds",
                startup_timeout_seconds
            )));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}
