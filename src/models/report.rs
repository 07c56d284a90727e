use crate::error::BackendError;
use crate::models::analysis::{RiskScore, Verdict};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortKind {
    AuthenticationFailed,
    BackendUnreachable,
}

/// Why the analysis queue stopped before every script was submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAbort {
    pub kind: AbortKind,
    pub message: String,
}

impl RunAbort {
    /// Maps a fatal backend error to an abort; `None` for per-script errors.
    pub fn from_backend_error(error: &BackendError) -> Option<Self> {
        let kind = match error {
            BackendError::AuthFailed { .. } => AbortKind::AuthenticationFailed,
            BackendError::Unreachable { .. } | BackendError::InitFailed(_) => {
                AbortKind::BackendUnreachable
            }
            _ => return None,
        };
        Some(Self {
            kind,
            message: error.to_string(),
        })
    }

    pub fn headline(&self) -> &'static str {
        match self.kind {
            AbortKind::AuthenticationFailed => "Analysis aborted: authentication failed",
            AbortKind::BackendUnreachable => "Analysis aborted: backend unreachable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub overall_risk: RiskScore,
    pub flagged_count: usize,
    pub total_count: usize,
    pub ok_count: usize,
    /// No verdict parsed cleanly, so `overall_risk` carries no information.
    pub low_confidence: bool,
    pub per_script: Vec<Verdict>,
    pub abort: Option<RunAbort>,
    pub cancelled: bool,
    pub backend_label: String,
}

impl AnalysisSummary {
    pub fn new(per_script: Vec<Verdict>) -> Self {
        Self {
            overall_risk: RiskScore::UNKNOWN,
            flagged_count: 0,
            total_count: per_script.len(),
            ok_count: 0,
            low_confidence: true,
            per_script,
            abort: None,
            cancelled: false,
            backend_label: String::new(),
        }
    }

    pub fn with_abort(mut self, abort: Option<RunAbort>) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn with_backend_label(mut self, label: impl Into<String>) -> Self {
        self.backend_label = label.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    pub fn failed_count(&self) -> usize {
        self.per_script.iter().filter(|v| v.is_failed()).count()
    }

    /// A run is inconclusive when there were scripts but none parsed cleanly.
    pub fn is_inconclusive(&self) -> bool {
        self.total_count > 0 && self.low_confidence
    }

    pub fn is_complete(&self) -> bool {
        self.abort.is_none() && !self.cancelled
    }
}
