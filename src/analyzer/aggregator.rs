use crate::models::{AnalysisSummary, RiskScore, Verdict};
use tracing::debug;

pub const DEFAULT_FLAG_THRESHOLD: u8 = 5;

pub struct AnalysisAggregator {
    flag_threshold: u8,
}

impl AnalysisAggregator {
    pub fn new(flag_threshold: u8) -> Self {
        Self { flag_threshold }
    }

    pub fn flag_threshold(&self) -> u8 {
        self.flag_threshold
    }

    /// Folds per-script verdicts into a run summary. Only cleanly parsed
    /// verdicts contribute to the overall risk.
    pub fn aggregate(&self, verdicts: Vec<Verdict>) -> AnalysisSummary {
        let ok_scores: Vec<u8> = verdicts
            .iter()
            .filter(|v| v.is_ok())
            .filter_map(|v| v.risk_score.value())
            .collect();

        let overall_risk = ok_scores
            .iter()
            .max()
            .and_then(|max| RiskScore::new(*max))
            .unwrap_or(RiskScore::UNKNOWN);

        let flagged_count = verdicts
            .iter()
            .filter(|v| v.is_flagged(self.flag_threshold))
            .count();

        let mut per_script = verdicts;
        // Vec::sort_by is stable, so equal scores keep extraction order.
        per_script.sort_by(|a, b| a.risk_score.severity_order(&b.risk_score));

        let mut summary = AnalysisSummary::new(per_script);
        summary.overall_risk = overall_risk;
        summary.flagged_count = flagged_count;
        summary.ok_count = ok_scores.len();
        summary.low_confidence = ok_scores.is_empty();

        debug!(
            "Aggregated {} verdicts: overall {}, {} flagged, {} ok",
            summary.total_count, summary.overall_risk, summary.flagged_count, summary.ok_count
        );
        summary
    }

    /// Warnings worth surfacing next to the summary.
    pub fn validate_analysis_quality(&self, summary: &AnalysisSummary) -> Vec<String> {
        let mut warnings = Vec::new();

        for verdict in &summary.per_script {
            if verdict.is_ok() && verdict.confidence < 0.5 {
                warnings.push(format!(
                    "{}: Low confidence ({:.0}%) - results may be unreliable",
                    verdict.script_id,
                    verdict.confidence * 100.0
                ));
            }
            if verdict.input_truncated {
                warnings.push(format!(
                    "{}: Script was truncated before analysis",
                    verdict.script_id
                ));
            }
        }

        let failed = summary.failed_count();
        if failed > 0 {
            warnings.push(format!(
                "{} of {} script(s) could not be analyzed",
                failed, summary.total_count
            ));
        }

        warnings
    }
}

impl Default for AnalysisAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_FLAG_THRESHOLD)
    }
}
