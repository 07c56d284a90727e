use crate::error::BackendError;
use crate::models::{ParseStatus, RiskScore, ScriptId, Verdict, MAX_RISK_SCORE};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref THINK_BLOCK: Regex = Regex::new(r"(?is)<think>.*?</think>").unwrap();
    static ref THINK_TAG: Regex = Regex::new(r"(?i)</?think>").unwrap();
    static ref SCORE_TAG: Regex = Regex::new(r"(?is)<score>(.*?)</score>").unwrap();
    static ref SCORE_PHRASE: Regex =
        Regex::new(r"(?i)(?:risk\s+)?score\s*[:=]\s*(-?\d+(?:\.\d+)?)").unwrap();
    static ref SCORE_OUT_OF_TEN: Regex = Regex::new(r"(-?\d+(?:\.\d+)?)\s*/\s*10\b").unwrap();
    static ref NUMBER: Regex = Regex::new(r"-?\d+(?:\.\d+)?").unwrap();
    static ref FLAGS_SECTION: Regex =
        Regex::new(r"(?is)<flags>(.*?)(?:</flags>|<analysis>|$)").unwrap();
    static ref ANALYSIS_SECTION: Regex = Regex::new(r"(?is)<analysis>(.*?)(?:</analysis>|$)").unwrap();
    static ref FLAGGED_HEADING: Regex =
        Regex::new(r"(?i)^\s*flagged(?:\s+constructs|\s+patterns)?\s*:\s*(.*)$").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"(?i)</?(?:score|flags|analysis)>").unwrap();
    static ref LIST_MARKER: Regex = Regex::new(r"^(?:[-*•]+|\d+[.)])\s*").unwrap();
}

const PLACEHOLDER_FLAGS: &[&str] = &["none", "n/a", "na", "nothing", "no flags", "none found", "-"];

const ON_TOPIC_WORDS: &[&str] = &[
    "malicious",
    "suspicious",
    "risk",
    "security",
    "exec",
    "network",
    "subprocess",
    "harmless",
    "safe",
];

/// Turns free-form model output into a `Verdict`. Parsing never fails: output
/// it cannot make sense of degrades to `Partial` or `Failed`.
pub struct VerdictParser;

impl VerdictParser {
    pub fn parse(raw: &str, script_id: &ScriptId, truncated: bool) -> Verdict {
        if raw.trim().is_empty() {
            return Verdict::new(script_id.clone(), ParseStatus::Failed)
                .with_rationale("Backend returned an empty response".to_string())
                .with_truncated_input(truncated);
        }

        let answer = strip_reasoning(raw);
        let answer = answer.trim();
        if answer.is_empty() {
            return Verdict::new(script_id.clone(), ParseStatus::Failed)
                .with_rationale("Model produced reasoning but no answer".to_string())
                .with_truncated_input(truncated);
        }

        let flags = extract_flags(answer);
        let score = extract_score(answer);

        let verdict = match score {
            Some(score) => Verdict::new(script_id.clone(), ParseStatus::Ok)
                .with_risk_score(score)
                .with_rationale(extract_rationale(answer))
                .with_confidence(adjust_for_truncation(calculate_confidence(answer), truncated)),
            None => Verdict::new(script_id.clone(), ParseStatus::Partial)
                .with_rationale(raw.to_string())
                .with_confidence(adjust_for_truncation(
                    calculate_confidence(answer).min(0.5),
                    truncated,
                )),
        };

        verdict.with_flagged_patterns(flags).with_truncated_input(truncated)
    }

    /// Verdict for a request that ended in a backend error.
    pub fn from_error(script_id: &ScriptId, error: &BackendError, truncated: bool) -> Verdict {
        Verdict::failed(script_id.clone(), error).with_truncated_input(truncated)
    }
}

fn strip_reasoning(raw: &str) -> String {
    let without_blocks = THINK_BLOCK.replace_all(raw, "");
    // An unclosed <think> may still wrap the real answer, so only the tag goes.
    THINK_TAG.replace_all(&without_blocks, "").into_owned()
}

fn extract_score(text: &str) -> Option<RiskScore> {
    if let Some(caps) = SCORE_TAG.captures(text) {
        if let Some(score) = NUMBER.find(&caps[1]).and_then(|m| to_risk_score(m.as_str())) {
            return Some(score);
        }
    }

    SCORE_PHRASE
        .captures_iter(text)
        .chain(SCORE_OUT_OF_TEN.captures_iter(text))
        .find_map(|caps| to_risk_score(&caps[1]))
}

fn to_risk_score(number: &str) -> Option<RiskScore> {
    let value = number.parse::<f64>().ok()?.round();
    if !(0.0..=f64::from(MAX_RISK_SCORE)).contains(&value) {
        return None;
    }
    RiskScore::new(value as u8)
}

fn extract_flags(text: &str) -> Vec<String> {
    let candidates: Vec<String> = match FLAGS_SECTION.captures(text) {
        Some(caps) => split_flag_lines(caps[1].lines()),
        None => flagged_heading_block(text),
    };

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|flag| !PLACEHOLDER_FLAGS.contains(&flag.to_lowercase().as_str()))
        .filter(|flag| seen.insert(flag.to_lowercase()))
        .collect()
}

fn flagged_heading_block(text: &str) -> Vec<String> {
    let mut lines = text.lines();
    let mut block = Vec::new();

    while let Some(line) = lines.next() {
        if let Some(caps) = FLAGGED_HEADING.captures(line) {
            block.push(caps[1].to_string());
            block.extend(
                lines
                    .by_ref()
                    .take_while(|l| !l.trim().is_empty())
                    .map(str::to_string),
            );
            break;
        }
    }

    split_flag_lines(block.iter().map(String::as_str))
}

fn split_flag_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<String> {
    lines
        .flat_map(|line| line.split(';'))
        .map(|item| LIST_MARKER.replace(item.trim(), "").trim().trim_end_matches('.').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn extract_rationale(text: &str) -> String {
    if let Some(caps) = ANALYSIS_SECTION.captures(text) {
        let analysis = caps[1].trim();
        if !analysis.is_empty() {
            return analysis.to_string();
        }
    }

    let without_score = SCORE_TAG.replace_all(text, "");
    ANY_TAG.replace_all(&without_score, "").trim().to_string()
}

fn calculate_confidence(answer: &str) -> f32 {
    let lower = answer.to_lowercase();
    if answer.len() > 100 && ON_TOPIC_WORDS.iter().any(|w| lower.contains(w)) {
        0.85
    } else if answer.len() > 50 {
        0.70
    } else {
        0.50
    }
}

fn adjust_for_truncation(confidence: f32, truncated: bool) -> f32 {
    if truncated {
        confidence * 0.7
    } else {
        confidence
    }
}
