use crate::cancellation::CancellationSignal;
use crate::error::ExtractionError;
use crate::extractor::config::{ExtractorConfig, ExtractorKind};
use crate::extractor::inventory::collect_scripts;
use crate::models::ScriptInventory;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

const HELPER_SCRIPT: &str = include_str!("../../assets/extract_texts.py");
const MAX_STDERR_CHARS: usize = 2000;

pub struct ExtractorRunner {
    config: ExtractorConfig,
    cancel: CancellationSignal,
}

impl ExtractorRunner {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            cancel: CancellationSignal::never(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs the extractor against `container` and catalogs what it wrote into
    /// `output_dir`. The directory is kept afterwards.
    pub async fn extract(
        &self,
        container: &Path,
        output_dir: &Path,
    ) -> Result<ScriptInventory, ExtractionError> {
        let is_file = tokio::fs::metadata(container)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ExtractionError::ContainerNotFound {
                path: container.to_path_buf(),
            });
        }
        // Opening proves readability before a subprocess is involved.
        tokio::fs::File::open(container).await?;

        // Previous output is only cleared once there is something to replace it.
        let program = self.resolve_program()?;
        prepare_output_dir(output_dir).await?;
        self.run_subprocess(&program, container, output_dir).await?;

        let container_name = container
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = output_dir.to_path_buf();
        let name = container_name.clone();
        let inventory = tokio::task::spawn_blocking(move || collect_scripts(&dir, &name))
            .await
            .map_err(join_error)??;

        info!(
            "Extracted {} script(s), {} bytes from {}",
            inventory.len(),
            inventory.total_bytes(),
            container_name
        );
        Ok(inventory)
    }

    fn resolve_program(&self) -> Result<PathBuf, ExtractionError> {
        let not_found = || ExtractionError::ExtractorNotFound {
            program: self.config.program.clone(),
        };
        self.config.validate().map_err(|_| not_found())?;
        self.config.resolve_program().ok_or_else(not_found)
    }

    async fn run_subprocess(
        &self,
        program: &Path,
        container: &Path,
        output_dir: &Path,
    ) -> Result<(), ExtractionError> {
        // Must outlive the child; the file is removed on drop.
        let helper = match self.config.kind {
            ExtractorKind::Blender => Some(
                tokio::task::spawn_blocking(write_helper_script)
                    .await
                    .map_err(join_error)??,
            ),
            ExtractorKind::Generic => None,
        };

        let args = self
            .config
            .build_args(container, output_dir, helper.as_ref().map(|h| h.path()));

        debug!("Running extractor: {} {:?}", program.display(), args);

        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            warn!("Failed to spawn extractor {}: {}", program.display(), e);
            ExtractionError::ExtractorNotFound {
                program: self.config.program.clone(),
            }
        })?;

        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        let status = self.wait_for_exit(&mut child).await?;

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            warn!("Extractor exited with {}", status);
            return Err(ExtractionError::SubprocessFailed {
                code: status.code(),
                stderr: truncate_chars(stderr.trim(), MAX_STDERR_CHARS),
            });
        }

        if !stdout.is_empty() {
            debug!("Extractor stdout:\n{}", String::from_utf8_lossy(&stdout));
        }
        if !stderr.is_empty() {
            debug!("Extractor stderr:\n{}", String::from_utf8_lossy(&stderr));
        }

        Ok(())
    }

    async fn wait_for_exit(&self, child: &mut Child) -> Result<ExitStatus, ExtractionError> {
        let timeout_secs = self.config.timeout_seconds;

        tokio::select! {
            waited = timeout(Duration::from_secs(timeout_secs), child.wait()) => match waited {
                Ok(Ok(status)) => Ok(status),
                Ok(Err(e)) => Err(ExtractionError::Io(e)),
                Err(_) => {
                    warn!("Extractor timed out after {}s, killing it", timeout_secs);
                    terminate(child).await;
                    Err(ExtractionError::Timeout { timeout: timeout_secs })
                }
            },
            _ = self.cancel.cancelled() => {
                info!("Extraction cancelled, killing extractor");
                terminate(child).await;
                Err(ExtractionError::Cancelled)
            }
        }
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Could not kill extractor: {}", e);
        return;
    }
    let _ = child.wait().await;
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

fn join_error(e: tokio::task::JoinError) -> ExtractionError {
    ExtractionError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

fn write_helper_script() -> Result<tempfile::NamedTempFile, ExtractionError> {
    let mut helper = tempfile::Builder::new()
        .prefix("blendscan-extract-")
        .suffix(".py")
        .tempfile()?;
    helper.write_all(HELPER_SCRIPT.as_bytes())?;
    helper.flush()?;
    Ok(helper)
}

/// Creates `output_dir` and clears anything a previous run left there.
async fn prepare_output_dir(output_dir: &Path) -> Result<(), ExtractionError> {
    tokio::fs::create_dir_all(output_dir).await?;

    let mut entries = tokio::fs::read_dir(output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
    }

    Ok(())
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
