pub mod analysis;
pub mod report;
pub mod script;

pub use analysis::{AnalysisRequest, ParseStatus, RiskLevel, RiskScore, Verdict, MAX_RISK_SCORE};
pub use report::{AbortKind, AnalysisSummary, RunAbort};
pub use script::{ExtractedScript, ScriptId, ScriptInventory};
