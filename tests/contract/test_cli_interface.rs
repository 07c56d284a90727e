use blendscan::analyzer::{BackendConfig, BackendKind};
use blendscan::cli::Cli;
use clap::Parser;
use std::process::Command;

fn blendscan() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_blendscan"));
    command.env("NO_COLOR", "1").env_remove("BLENDSCAN_TIMEOUT");
    command
}

#[test]
fn filepath_is_required() {
    let result = Cli::try_parse_from(["blendscan"]);
    assert!(result.is_err());
}

#[test]
fn remote_flags_must_be_given_together() {
    let missing_model =
        Cli::try_parse_from(["blendscan", "--filepath", "a.blend", "--lmstudio-api", "http://localhost:1234/v1"]);
    assert!(missing_model.is_err());

    let missing_api = Cli::try_parse_from(["blendscan", "--filepath", "a.blend", "--lmstudio-model", "qwen"]);
    assert!(missing_api.is_err());

    let both = Cli::try_parse_from([
        "blendscan",
        "--filepath",
        "a.blend",
        "--lmstudio-api",
        "http://localhost:1234/v1",
        "--lmstudio-model",
        "qwen",
    ])
    .unwrap();
    assert!(both.is_remote());
    assert_eq!(both.backend_config().kind(), BackendKind::Remote);
}

#[test]
fn local_backend_is_the_default() {
    let cli = Cli::try_parse_from(["blendscan", "--filepath", "scene.blend"]).unwrap();
    assert!(!cli.is_remote());
    assert_eq!(cli.get_jobs(), 1);
    assert!(matches!(cli.backend_config(), BackendConfig::Local(_)));
}

#[test]
fn model_and_hf_repo_conflict() {
    let result = Cli::try_parse_from([
        "blendscan",
        "--filepath",
        "scene.blend",
        "--model",
        "qwen.gguf",
        "--hf-repo",
        "unsloth/Qwen3-4B-GGUF:Q4_K_M",
    ]);
    assert!(result.is_err());
}

#[test]
fn out_of_range_values_are_rejected() {
    for args in [
        vec!["blendscan", "--filepath", "a.blend", "--timeout", "5"],
        vec!["blendscan", "--filepath", "a.blend", "--jobs", "0"],
        vec!["blendscan", "--filepath", "a.blend", "--flag-threshold", "11"],
        vec!["blendscan", "--filepath", "a.blend", "--max-script-chars", "0"],
    ] {
        assert!(Cli::try_parse_from(&args).is_err(), "accepted {:?}", args);
    }
}

#[test]
fn non_http_api_url_fails_validation() {
    let cli = Cli::try_parse_from([
        "blendscan",
        "--filepath",
        "a.blend",
        "--lmstudio-api",
        "localhost:1234",
        "--lmstudio-model",
        "qwen",
    ])
    .unwrap();
    assert!(cli.to_run_config().is_err());
}

#[test]
fn run_config_carries_flags() {
    let cli = Cli::try_parse_from([
        "blendscan",
        "--filepath",
        "scene.blend",
        "-o",
        "/tmp/out",
        "-j",
        "3",
        "--max-script-chars",
        "500",
        "--flag-threshold",
        "7",
    ])
    .unwrap();
    let config = cli.to_run_config().unwrap();

    assert_eq!(config.jobs, 3);
    assert_eq!(config.max_script_chars, 500);
    assert_eq!(config.flag_threshold, 7);
    assert_eq!(config.output_dir, std::path::PathBuf::from("/tmp/out"));
}

#[test]
fn binary_reports_usage_errors_with_exit_2() {
    let output = blendscan()
        .args(["--filepath", "a.blend", "--lmstudio-api", "http://localhost:1234/v1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn binary_rejects_missing_container_with_exit_3() {
    let dir = tempfile::tempdir().unwrap();
    let output = blendscan()
        .arg("--filepath")
        .arg(dir.path().join("missing.blend"))
        .arg("-o")
        .arg(dir.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.blend"), "stderr: {}", stderr);
    assert!(!dir.path().join("report__missing.html").exists());
}

#[test]
fn binary_rejects_non_blend_file_with_exit_3() {
    let dir = tempfile::tempdir().unwrap();
    let container = dir.path().join("notes.txt");
    std::fs::write(&container, "not a blend file").unwrap();

    let output = blendscan()
        .arg("--filepath")
        .arg(&container)
        .arg("-o")
        .arg(dir.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn help_lists_backend_flags() {
    let output = blendscan().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--filepath", "--blender-exec", "--lmstudio-api", "--lmstudio-model"] {
        assert!(stdout.contains(flag), "help is missing {}", flag);
    }
}
