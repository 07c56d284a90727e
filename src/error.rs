use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Analysis backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid command line arguments: {0}")]
    InvalidArguments(String),

    #[error("Report generation failed: {0}")]
    Report(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failures of the extraction step. Any of these aborts the whole run.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Container file not found: {}", path.display())]
    ContainerNotFound { path: PathBuf },

    #[error("Not a .blend container: {}", path.display())]
    InvalidContainer { path: PathBuf },

    #[error("Extractor executable not found: {program}")]
    ExtractorNotFound { program: String },

    #[error("Extractor timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    #[error("Extractor exited with status {code:?}: {stderr}")]
    SubprocessFailed { code: Option<i32>, stderr: String },

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("I/O error during extraction: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Backend unreachable after {attempts} attempt(s): {message}")]
    Unreachable { attempts: u32, message: String },

    #[error("Authentication failed (HTTP {status})")]
    AuthFailed { status: u16 },

    #[error("Request timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    #[error("Invalid response from backend: {0}")]
    InvalidResponse(String),

    #[error("Backend rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Local model runtime failed to initialise: {0}")]
    InitFailed(String),

    #[error("Backend startup cancelled")]
    Cancelled,
}

impl BackendError {
    /// Errors that make every further request pointless for this run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BackendError::AuthFailed { .. }
                | BackendError::Unreachable { .. }
                | BackendError::InitFailed(_)
        )
    }
}

impl ScanError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ScanError::InvalidArguments(_) => 2,
            ScanError::Extraction(e) => match e {
                ExtractionError::ContainerNotFound { .. }
                | ExtractionError::InvalidContainer { .. } => 3,
                ExtractionError::Timeout { .. } => 4,
                ExtractionError::ExtractorNotFound { .. }
                | ExtractionError::SubprocessFailed { .. } => 5,
                ExtractionError::Cancelled => 130,
                ExtractionError::Io(_) => 1,
            },
            ScanError::Backend(BackendError::Cancelled) => 130,
            ScanError::Backend(_) => 6,
            _ => 1,
        }
    }
}
