//! One scan of one container: extract, analyze, aggregate, report.

use crate::analyzer::aggregator::{AnalysisAggregator, DEFAULT_FLAG_THRESHOLD};
use crate::analyzer::llm_client::{create_backend, AnalysisBackend, BackendConfig};
use crate::analyzer::local_runtime::DEFAULT_LOCAL_MAX_TOKENS;
use crate::analyzer::orchestrator::{AnalysisOrchestrator, AnalysisRun};
use crate::analyzer::prompts::{PromptTemplate, DEFAULT_MAX_SCRIPT_CHARS};
use crate::cancellation::CancellationSignal;
use crate::cli::reporter::ReportBuilder;
use crate::error::{BackendError, ExtractionError, ScanError};
use crate::extractor::{ExtractorConfig, ExtractorRunner};
use crate::models::{AnalysisSummary, RunAbort, Verdict, MAX_RISK_SCORE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const EXTRACTED_SCRIPTS_DIR: &str = "extracted_scripts";
pub const CONTAINER_EXTENSION: &str = "blend";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub container: PathBuf,
    pub extractor: ExtractorConfig,
    pub backend: BackendConfig,
    pub output_dir: PathBuf,
    pub jobs: usize,
    pub max_script_chars: usize,
    pub max_tokens: Option<u32>,
    pub flag_threshold: u8,
}

impl RunConfig {
    /// The bundled runtime gets a completion cap; a remote endpoint keeps
    /// its own default unless one is set.
    pub fn new(container: impl Into<PathBuf>, extractor: ExtractorConfig, backend: BackendConfig) -> Self {
        let max_tokens = match backend {
            BackendConfig::Local(_) => Some(DEFAULT_LOCAL_MAX_TOKENS),
            BackendConfig::Remote(_) => None,
        };
        Self {
            container: container.into(),
            extractor,
            backend,
            output_dir: PathBuf::from("."),
            jobs: 1,
            max_script_chars: DEFAULT_MAX_SCRIPT_CHARS,
            max_tokens,
            flag_threshold: DEFAULT_FLAG_THRESHOLD,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_max_script_chars(mut self, max_script_chars: usize) -> Self {
        self.max_script_chars = max_script_chars;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_flag_threshold(mut self, flag_threshold: u8) -> Self {
        self.flag_threshold = flag_threshold;
        self
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        let is_blend = self
            .container
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(CONTAINER_EXTENSION))
            .unwrap_or(false);
        if !is_blend {
            return Err(ExtractionError::InvalidContainer {
                path: self.container.clone(),
            }
            .into());
        }

        if self.jobs == 0 {
            return Err(ScanError::InvalidArguments("jobs must be at least 1".to_string()));
        }
        if self.max_script_chars == 0 {
            return Err(ScanError::InvalidArguments(
                "max script chars must be at least 1".to_string(),
            ));
        }
        if self.flag_threshold > MAX_RISK_SCORE {
            return Err(ScanError::InvalidArguments(format!(
                "flag threshold must be between 0 and {}",
                MAX_RISK_SCORE
            )));
        }
        self.extractor.validate().map_err(ScanError::InvalidArguments)?;
        Ok(())
    }

    pub fn container_stem(&self) -> String {
        self.container
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "container".to_string())
    }

    /// `<output_dir>/extracted_scripts/<container stem>`
    pub fn scripts_dir(&self) -> PathBuf {
        self.output_dir
            .join(EXTRACTED_SCRIPTS_DIR)
            .join(self.container_stem())
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report_path: PathBuf,
    pub summary: AnalysisSummary,
}

impl RunOutput {
    /// Process exit code for a run that produced a report.
    pub fn exit_code(&self) -> i32 {
        if self.summary.cancelled {
            130
        } else if self.summary.abort.is_some() {
            6
        } else {
            0
        }
    }
}

/// Runs a full scan. Extraction errors end the run without a report; once
/// extraction succeeds a report is always written.
pub async fn run(config: &RunConfig, cancel: &CancellationSignal) -> Result<RunOutput, ScanError> {
    config.validate()?;

    let scripts_dir = config.scripts_dir();
    info!(
        "Scanning {} (scripts in {})",
        config.container.display(),
        scripts_dir.display()
    );

    let inventory = ExtractorRunner::new(config.extractor.clone())
        .with_cancellation(cancel.clone())
        .extract(&config.container, &scripts_dir)
        .await?;

    let reporter = ReportBuilder::new(config.flag_threshold);
    let aggregator = AnalysisAggregator::new(config.flag_threshold);

    if inventory.is_empty() {
        info!("No scripts found; skipping model backend");
        let summary = aggregator
            .aggregate(Vec::new())
            .with_backend_label(config.backend.label());
        let report_path = reporter
            .write_report(&config.output_dir, &config.container, &summary, &[])
            .await?;
        return Ok(RunOutput {
            report_path,
            summary,
        });
    }

    let AnalysisRun {
        verdicts,
        abort,
        cancelled,
    } = match create_backend(&config.backend, cancel).await {
        Ok(backend) => {
            let backend: Arc<dyn AnalysisBackend> = backend.into();
            let prompt =
                PromptTemplate::new(config.max_script_chars).with_max_tokens(config.max_tokens);
            let run = AnalysisOrchestrator::new(backend.clone(), prompt, config.jobs)
                .analyze_inventory(&inventory, cancel)
                .await;
            backend.shutdown().await;
            run
        }
        Err(BackendError::Cancelled) => AnalysisRun {
            verdicts: inventory
                .iter()
                .map(|script| Verdict::skipped(script.id.clone(), "run cancelled"))
                .collect(),
            abort: None,
            cancelled: true,
        },
        // Extraction already succeeded, so the report still gets written.
        Err(error) => AnalysisRun {
            verdicts: inventory
                .iter()
                .map(|script| Verdict::skipped(script.id.clone(), "analysis backend failed to start"))
                .collect(),
            abort: RunAbort::from_backend_error(&error),
            cancelled: false,
        },
    };

    if let Some(ref abort) = abort {
        warn!("{}: {}", abort.headline(), abort.message);
    }

    let summary = aggregator
        .aggregate(verdicts)
        .with_abort(abort)
        .with_cancelled(cancelled)
        .with_backend_label(config.backend.label());

    for warning in aggregator.validate_analysis_quality(&summary) {
        warn!("{}", warning);
    }

    let report_path = reporter
        .write_report(&config.output_dir, &config.container, &summary, inventory.scripts())
        .await?;

    Ok(RunOutput {
        report_path,
        summary,
    })
}

/// Where [`run`] writes the report for `container`.
pub fn report_path_for(output_dir: &Path, container: &Path) -> PathBuf {
    output_dir.join(crate::cli::reporter::report_file_name(container))
}
