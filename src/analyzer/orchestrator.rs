use crate::analyzer::llm_client::AnalysisBackend;
use crate::analyzer::prompts::PromptTemplate;
use crate::analyzer::verdict_parser::VerdictParser;
use crate::cancellation::CancellationSignal;
use crate::error::BackendError;
use crate::models::{AnalysisRequest, RunAbort, ScriptId, ScriptInventory, Verdict};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Verdicts for one inventory plus how the queue ended.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    /// One verdict per script, in inventory order.
    pub verdicts: Vec<Verdict>,
    pub abort: Option<RunAbort>,
    pub cancelled: bool,
}

pub struct AnalysisOrchestrator {
    backend: Arc<dyn AnalysisBackend>,
    prompt: PromptTemplate,
    max_concurrent_requests: usize,
    request_timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(backend: Arc<dyn AnalysisBackend>, prompt: PromptTemplate, jobs: usize) -> Self {
        let request_timeout = backend.get_timeout();
        let max_concurrent_requests = jobs.max(1).min(backend.max_concurrency().max(1));

        Self {
            backend,
            prompt,
            max_concurrent_requests,
            request_timeout,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    pub fn get_model_info(&self) -> String {
        format!(
            "Model: {} ({}), Timeout: {}s, Max Concurrent: {}",
            self.backend.get_model_name(),
            self.backend.kind().as_str(),
            self.request_timeout.as_secs(),
            self.max_concurrent_requests
        )
    }

    /// Analyzes every script in `inventory`. Per-script failures become FAILED
    /// verdicts; fatal backend errors and cancellation stop new submissions
    /// while in-flight requests finish.
    pub async fn analyze_inventory(
        &self,
        inventory: &ScriptInventory,
        cancel: &CancellationSignal,
    ) -> AnalysisRun {
        info!("{}", self.get_model_info());

        let requests: Vec<AnalysisRequest> = inventory
            .iter()
            .map(|script| self.prompt.build_request(script))
            .collect();

        let abort: OnceLock<RunAbort> = OnceLock::new();
        let abort_ref = &abort;

        let completed: Vec<Verdict> = stream::iter(requests.iter())
            .map(|request| async move {
                if let Some(reason) = stop_reason(abort_ref, cancel) {
                    return Verdict::skipped(request.script_id.clone(), &reason)
                        .with_truncated_input(request.truncated);
                }

                let verdict = self.execute_single_analysis(request).await;

                match verdict {
                    Ok(verdict) => verdict,
                    Err(error) => {
                        if let Some(run_abort) = RunAbort::from_backend_error(&error) {
                            if abort_ref.set(run_abort).is_ok() {
                                warn!("Stopping analysis queue: {}", error);
                            }
                        }
                        VerdictParser::from_error(&request.script_id, &error, request.truncated)
                    }
                }
            })
            .buffer_unordered(self.max_concurrent_requests)
            .collect()
            .await;

        let cancelled = cancel.is_cancelled();
        if cancelled {
            info!("Analysis cancelled; unsubmitted scripts marked as not analyzed");
        }

        AnalysisRun {
            verdicts: in_inventory_order(inventory, completed),
            abort: abort.into_inner(),
            cancelled,
        }
    }

    async fn execute_single_analysis(&self, request: &AnalysisRequest) -> Result<Verdict, BackendError> {
        debug!("Analyzing {}", request.script_id);
        let start_time = Instant::now();

        let raw = timeout(self.request_timeout, self.backend.analyze(request))
            .await
            .map_err(|_| BackendError::Timeout {
                timeout: self.request_timeout.as_secs(),
            })??;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let verdict = VerdictParser::parse(&raw, &request.script_id, request.truncated)
            .with_model(self.backend.get_model_name(), duration_ms);

        debug!(
            "{} -> {} ({}, {}ms)",
            request.script_id,
            verdict.risk_score,
            verdict.parse_status.as_str(),
            duration_ms
        );
        Ok(verdict)
    }
}

fn stop_reason(abort: &OnceLock<RunAbort>, cancel: &CancellationSignal) -> Option<String> {
    if let Some(run_abort) = abort.get() {
        return Some(run_abort.headline().to_lowercase());
    }
    cancel.is_cancelled().then(|| "run cancelled".to_string())
}

/// Completion order is arbitrary under concurrency, so verdicts are keyed by id.
fn in_inventory_order(inventory: &ScriptInventory, completed: Vec<Verdict>) -> Vec<Verdict> {
    let mut by_id: HashMap<ScriptId, Verdict> = completed
        .into_iter()
        .map(|verdict| (verdict.script_id.clone(), verdict))
        .collect();

    inventory
        .iter()
        .map(|script| {
            by_id.remove(&script.id).unwrap_or_else(|| {
                Verdict::skipped(script.id.clone(), "no result was recorded")
            })
        })
        .collect()
}
