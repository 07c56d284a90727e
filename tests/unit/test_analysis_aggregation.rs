use blendscan::analyzer::AnalysisAggregator;
use blendscan::error::BackendError;
use blendscan::models::{ParseStatus, RiskScore, RunAbort, ScriptId, Verdict};

fn scored(id: &str, status: ParseStatus, score: Option<u8>) -> Verdict {
    let verdict = Verdict::new(ScriptId::new(id), status);
    match score {
        Some(score) => verdict.with_risk_score(RiskScore::new(score).unwrap()),
        None => verdict,
    }
}

#[test]
fn overall_risk_ignores_partial_and_failed() {
    let summary = AnalysisAggregator::new(5).aggregate(vec![
        scored("ok_low", ParseStatus::Ok, Some(2)),
        scored("partial", ParseStatus::Partial, None),
        Verdict::failed(ScriptId::new("failed"), &BackendError::Timeout { timeout: 10 }),
    ]);

    assert_eq!(summary.overall_risk.value(), Some(2));
    assert_eq!(summary.total_count, 3);
    assert_eq!(summary.ok_count, 1);
    assert_eq!(summary.failed_count(), 1);
    assert!(!summary.low_confidence);
}

#[test]
fn every_verdict_survives_aggregation() {
    let verdicts: Vec<Verdict> = (0..10u8)
        .map(|i| scored(&format!("s{}", i), ParseStatus::Ok, Some(i)))
        .collect();
    let summary = AnalysisAggregator::default().aggregate(verdicts);

    assert_eq!(summary.per_script.len(), 10);
    assert_eq!(summary.overall_risk.value(), Some(9));
    // Scores 6..=9 are above the default threshold of 5.
    assert_eq!(summary.flagged_count, 4);
    let scores: Vec<Option<u8>> = summary.per_script.iter().map(|v| v.risk_score.value()).collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(scores, sorted);
}

#[test]
fn all_failed_run_is_inconclusive_and_aborted() {
    let error = BackendError::AuthFailed { status: 403 };
    let summary = AnalysisAggregator::default()
        .aggregate(vec![
            Verdict::failed(ScriptId::new("a"), &error),
            Verdict::skipped(ScriptId::new("b"), "analysis aborted"),
        ])
        .with_abort(RunAbort::from_backend_error(&error));

    assert!(summary.is_inconclusive());
    assert!(summary.overall_risk.is_unknown());
    assert!(!summary.is_complete());
    assert_eq!(summary.per_script.len(), 2);
}

#[test]
fn lower_threshold_flags_more_scripts() {
    let verdicts = || {
        vec![
            scored("a", ParseStatus::Ok, Some(1)),
            scored("b", ParseStatus::Ok, Some(3)),
        ]
    };
    assert_eq!(AnalysisAggregator::new(5).aggregate(verdicts()).flagged_count, 0);
    assert_eq!(AnalysisAggregator::new(2).aggregate(verdicts()).flagged_count, 1);
    assert_eq!(AnalysisAggregator::new(0).aggregate(verdicts()).flagged_count, 2);
}
