use crate::error::BackendError;
use crate::models::ScriptId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const MAX_RISK_SCORE: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub script_id: ScriptId,
    pub system_prompt: String,
    pub user_prompt: String,
    /// The script text was cut to fit the prompt budget.
    pub truncated: bool,
    pub original_chars: usize,
    pub max_tokens: Option<u32>,
}

impl AnalysisRequest {
    pub fn prompt_size(&self) -> usize {
        self.system_prompt.len() + self.user_prompt.len()
    }
}

/// A 0-10 risk rating (10 = most dangerous) or the `unknown` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RiskScore(Option<u8>);

impl RiskScore {
    pub const UNKNOWN: RiskScore = RiskScore(None);

    /// Returns `None` for values outside the scale.
    pub fn new(value: u8) -> Option<Self> {
        (value <= MAX_RISK_SCORE).then_some(Self(Some(value)))
    }

    pub fn value(&self) -> Option<u8> {
        self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_none()
    }

    pub fn exceeds(&self, threshold: u8) -> bool {
        matches!(self.0, Some(v) if v > threshold)
    }

    pub fn level(&self) -> Option<RiskLevel> {
        self.0.map(RiskLevel::from_score)
    }

    /// Descending by score with unknown last.
    pub fn severity_order(&self, other: &Self) -> Ordering {
        match (self.0, other.0) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{}/10", v),
            None => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=1 => RiskLevel::Info,
            2..=3 => RiskLevel::Low,
            4..=5 => RiskLevel::Medium,
            6..=7 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Info => "info",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParseStatus {
    Ok,
    Partial,
    Failed,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Ok => "ok",
            ParseStatus::Partial => "partial",
            ParseStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub script_id: ScriptId,
    pub risk_score: RiskScore,
    pub flagged_patterns: Vec<String>,
    pub rationale_text: String,
    pub parse_status: ParseStatus,
    pub confidence: f32,
    pub input_truncated: bool,
    pub model_used: String,
    pub analysis_duration_ms: u64,
}

impl Verdict {
    pub fn new(script_id: ScriptId, parse_status: ParseStatus) -> Self {
        Self {
            script_id,
            risk_score: RiskScore::UNKNOWN,
            flagged_patterns: Vec::new(),
            rationale_text: String::new(),
            parse_status,
            confidence: 0.0,
            input_truncated: false,
            model_used: String::new(),
            analysis_duration_ms: 0,
        }
    }

    /// Verdict for a script whose request never produced usable output.
    pub fn failed(script_id: ScriptId, error: &BackendError) -> Self {
        Self::new(script_id, ParseStatus::Failed).with_rationale(error.to_string())
    }

    /// Verdict for a script that was never submitted.
    pub fn skipped(script_id: ScriptId, reason: &str) -> Self {
        Self::new(script_id, ParseStatus::Failed)
            .with_rationale(format!("Not analyzed: {}", reason))
    }

    pub fn with_risk_score(mut self, risk_score: RiskScore) -> Self {
        self.risk_score = risk_score;
        self
    }

    pub fn with_flagged_patterns(mut self, patterns: Vec<String>) -> Self {
        self.flagged_patterns = patterns;
        self
    }

    pub fn with_rationale(mut self, rationale: String) -> Self {
        self.rationale_text = rationale;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_truncated_input(mut self, truncated: bool) -> Self {
        self.input_truncated = truncated;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>, duration_ms: u64) -> Self {
        self.model_used = model.into();
        self.analysis_duration_ms = duration_ms;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.parse_status == ParseStatus::Ok
    }

    pub fn is_failed(&self) -> bool {
        self.parse_status == ParseStatus::Failed
    }

    pub fn is_flagged(&self, threshold: u8) -> bool {
        !self.flagged_patterns.is_empty() || self.risk_score.exceeds(threshold)
    }
}
