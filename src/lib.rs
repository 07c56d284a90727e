pub mod analyzer;
pub mod cancellation;
pub mod cli;
pub mod error;
pub mod extractor;
pub mod models;
pub mod pipeline;

pub use error::{BackendError, ExtractionError, ScanError};

// Re-export commonly used types
pub use models::{
    AnalysisRequest, AnalysisSummary, ExtractedScript, ParseStatus, RiskLevel, RiskScore,
    ScriptId, ScriptInventory, Verdict,
};

pub use analyzer::{BackendConfig, LocalRuntimeConfig, RemoteConfig};
pub use cancellation::{cancellation_pair, CancellationHandle, CancellationSignal};
pub use extractor::ExtractorConfig;
pub use pipeline::{run, RunConfig, RunOutput};

pub use cli::CliHandler;
