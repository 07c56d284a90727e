// Analyzer module - model backends, prompting, verdict parsing and aggregation

pub mod aggregator;
pub mod llm_client;
pub mod local_runtime;
pub mod orchestrator;
pub mod prompts;
pub mod remote;
pub mod verdict_parser;

pub use aggregator::AnalysisAggregator;
pub use llm_client::{create_backend, AnalysisBackend, BackendConfig, BackendKind};
pub use local_runtime::{LocalBackend, LocalModelSource, LocalRuntimeConfig, DEFAULT_LOCAL_MAX_TOKENS};
pub use orchestrator::{AnalysisOrchestrator, AnalysisRun};
pub use prompts::PromptTemplate;
pub use remote::{RemoteBackend, RemoteConfig};
pub use verdict_parser::VerdictParser;
