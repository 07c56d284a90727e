use blendscan::analyzer::VerdictParser;
use blendscan::error::BackendError;
use blendscan::models::{ParseStatus, ScriptId};

fn id() -> ScriptId {
    ScriptId::new("auto_run")
}

#[test]
fn parses_qwen_style_answer_with_reasoning() {
    let raw = "<think>\nThe script imports urllib and calls exec on the response. That is a dropper.\n</think>\n\n<Score>9</Score>\n<Flags>\n- urllib.request.urlopen to remote host\n- exec() of downloaded code\n</Flags>\n<Analysis>\nOn load, the script downloads Python code from a remote server and executes it.\n</Analysis>";
    let verdict = VerdictParser::parse(raw, &id(), false);

    assert_eq!(verdict.parse_status, ParseStatus::Ok);
    assert_eq!(verdict.risk_score.value(), Some(9));
    assert_eq!(
        verdict.flagged_patterns,
        vec!["urllib.request.urlopen to remote host", "exec() of downloaded code"]
    );
    assert!(verdict.rationale_text.starts_with("On load"));
    assert!(!verdict.rationale_text.contains("dropper"));
}

#[test]
fn harmless_ui_script() {
    let raw = "<Score>0</Score>\n<Flags>\nnone\n</Flags>\n<Analysis>Registers a panel in the 3D viewport sidebar.</Analysis>";
    let verdict = VerdictParser::parse(raw, &id(), false);

    assert!(verdict.is_ok());
    assert_eq!(verdict.risk_score.value(), Some(0));
    assert!(verdict.flagged_patterns.is_empty());
    assert!(!verdict.is_flagged(5));
}

#[test]
fn unparseable_output_is_partial_and_kept_verbatim() {
    let raw = "I cannot evaluate this script without more context.";
    let verdict = VerdictParser::parse(raw, &id(), false);

    assert_eq!(verdict.parse_status, ParseStatus::Partial);
    assert!(verdict.risk_score.is_unknown());
    assert_eq!(verdict.rationale_text, raw);
}

#[test]
fn negative_and_oversized_scores_are_rejected() {
    for raw in ["<Score>-1</Score>", "<Score>11</Score>", "score: 15"] {
        let verdict = VerdictParser::parse(raw, &id(), false);
        assert!(verdict.risk_score.is_unknown(), "accepted score in {}", raw);
        assert_eq!(verdict.parse_status, ParseStatus::Partial);
    }
}

#[test]
fn flags_split_on_separators_and_deduplicated() {
    let raw = "<Score>7</Score><Flags>os.system; subprocess.Popen; OS.SYSTEM\n- eval</Flags><Analysis>Runs shell commands.</Analysis>";
    let verdict = VerdictParser::parse(raw, &id(), false);

    assert_eq!(verdict.flagged_patterns, vec!["os.system", "subprocess.Popen", "eval"]);
}

#[test]
fn commas_inside_a_flag_are_kept() {
    let raw = "<Score>8</Score><Flags>\n- os.system(cmd, shell=True)\n- open(path, 'wb')\n</Flags><Analysis>Shell out.</Analysis>";
    let verdict = VerdictParser::parse(raw, &id(), false);

    assert_eq!(
        verdict.flagged_patterns,
        vec!["os.system(cmd, shell=True)", "open(path, 'wb')"]
    );
}

#[test]
fn whitespace_output_is_failed() {
    let verdict = VerdictParser::parse("\n\n", &id(), true);
    assert_eq!(verdict.parse_status, ParseStatus::Failed);
    assert_eq!(verdict.confidence, 0.0);
    assert!(verdict.input_truncated);
}

#[test]
fn backend_error_becomes_failed_verdict() {
    let verdict = VerdictParser::from_error(&id(), &BackendError::AuthFailed { status: 401 }, false);
    assert!(verdict.is_failed());
    assert!(verdict.risk_score.is_unknown());
    assert!(verdict.rationale_text.contains("401"));
}

#[test]
fn parsing_is_deterministic() {
    let raw = "<Score>4</Score><Flags>bpy.app.handlers.load_post</Flags><Analysis>Adds a load handler.</Analysis>";
    let first = VerdictParser::parse(raw, &id(), false);
    let second = VerdictParser::parse(raw, &id(), false);
    assert_eq!(first, second);
}
