#![cfg(unix)]

use blendscan::cancellation::cancellation_pair;
use blendscan::error::ExtractionError;
use blendscan::extractor::{ExtractorConfig, ExtractorRunner};
use blendscan::models::ScriptId;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Writes an executable shell script that is invoked as `<script> <container> <output_dir>`.
fn fake_extractor(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn container(dir: &Path) -> PathBuf {
    let path = dir.join("scene.blend");
    std::fs::write(&path, b"BLENDER-v300").unwrap();
    path
}

fn runner(program: &Path) -> ExtractorRunner {
    ExtractorRunner::new(ExtractorConfig::generic(program.to_string_lossy().into_owned()).with_timeout(10))
}

#[tokio::test]
async fn test_extracts_files_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_extractor(
        dir.path(),
        "extract.sh",
        r#"printf 'import bpy\n' > "$2/ui_panel.py"
printf 'import os\nos.system("id")\n' > "$2/auto_run.py"
printf 'notes' > "$2/readme""#,
    );
    let out = dir.path().join("out");

    let inventory = runner(&program)
        .extract(&container(dir.path()), &out)
        .await
        .unwrap();

    let ids: Vec<&str> = inventory.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["auto_run", "readme", "ui_panel"]);
    assert_eq!(inventory.container_name(), "scene.blend");

    let auto_run = inventory.get(&ScriptId::new("auto_run")).unwrap();
    assert!(auto_run.source_text.contains("os.system"));
    assert_eq!(auto_run.line_count(), 2);
}

#[tokio::test]
async fn test_manifest_supplies_block_names() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_extractor(
        dir.path(),
        "extract.sh",
        r#"printf 'print(1)\n' > "$2/Text.001.py"
printf '{"blocks":[{"name":"Text.001","file":"Text.001.py"}]}' > "$2/.manifest.json""#,
    );

    let inventory = runner(&program)
        .extract(&container(dir.path()), &dir.path().join("out"))
        .await
        .unwrap();

    assert_eq!(inventory.len(), 1);
    let script = &inventory.scripts()[0];
    assert_eq!(script.id.as_str(), "Text.001");
    assert_eq!(script.block_name, "Text.001");
}

#[tokio::test]
async fn test_stale_output_is_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("left_over.py"), "print('old run')").unwrap();

    let program = fake_extractor(dir.path(), "extract.sh", r#"printf 'x = 1\n' > "$2/fresh.py""#);

    let inventory = runner(&program)
        .extract(&container(dir.path()), &out)
        .await
        .unwrap();

    assert_eq!(inventory.len(), 1);
    assert!(inventory.get(&ScriptId::new("left_over")).is_none());
    assert!(!out.join("left_over.py").exists());
}

#[tokio::test]
async fn test_no_scripts_is_an_empty_inventory() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_extractor(dir.path(), "extract.sh", "exit 0");

    let inventory = runner(&program)
        .extract(&container(dir.path()), &dir.path().join("out"))
        .await
        .unwrap();

    assert!(inventory.is_empty());
}

#[tokio::test]
async fn test_failing_extractor_reports_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_extractor(
        dir.path(),
        "extract.sh",
        "echo 'Error: File format is not supported' >&2\nexit 1",
    );

    let result = runner(&program)
        .extract(&container(dir.path()), &dir.path().join("out"))
        .await;

    match result {
        Err(ExtractionError::SubprocessFailed { code, stderr }) => {
            assert_eq!(code, Some(1));
            assert!(stderr.contains("not supported"));
        }
        other => panic!("expected subprocess failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_hanging_extractor_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_extractor(dir.path(), "extract.sh", "exec sleep 30");
    let runner = ExtractorRunner::new(
        ExtractorConfig::generic(program.to_string_lossy().into_owned()).with_timeout(1),
    );

    let started = std::time::Instant::now();
    let result = runner
        .extract(&container(dir.path()), &dir.path().join("out"))
        .await;

    assert!(matches!(result, Err(ExtractionError::Timeout { timeout: 1 })));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_missing_extractor() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ExtractorRunner::new(ExtractorConfig::generic("blendscan-no-such-extractor"));

    let result = runner
        .extract(&container(dir.path()), &dir.path().join("out"))
        .await;

    assert!(matches!(result, Err(ExtractionError::ExtractorNotFound { .. })));
}

#[tokio::test]
async fn test_missing_container_never_runs_extractor() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let program = fake_extractor(
        dir.path(),
        "extract.sh",
        &format!("touch '{}'", marker.display()),
    );

    let result = runner(&program)
        .extract(&dir.path().join("missing.blend"), &dir.path().join("out"))
        .await;

    assert!(matches!(result, Err(ExtractionError::ContainerNotFound { .. })));
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_cancellation_kills_extractor() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_extractor(dir.path(), "extract.sh", "exec sleep 30");
    let (handle, signal) = cancellation_pair();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.cancel();
    });

    let result = runner(&program)
        .with_cancellation(signal)
        .extract(&container(dir.path()), &dir.path().join("out"))
        .await;

    assert!(matches!(result, Err(ExtractionError::Cancelled)));
}

#[tokio::test]
async fn test_missing_extractor_keeps_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("auto_run.py"), "import os").unwrap();

    let runner = ExtractorRunner::new(ExtractorConfig::generic(
        dir.path().join("no-such-extractor").to_string_lossy().into_owned(),
    ));
    let result = runner.extract(&container(dir.path()), &out).await;

    assert!(matches!(result, Err(ExtractionError::ExtractorNotFound { .. })));
    assert_eq!(std::fs::read_to_string(out.join("auto_run.py")).unwrap(), "import os");
}

#[tokio::test]
async fn test_files_sharing_a_stem_are_all_inventoried() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_extractor(
        dir.path(),
        "extract.sh",
        r#"printf 'print(1)\n' > "$2/loader"
printf 'import os\nos.system("id")\n' > "$2/loader.py""#,
    );

    let inventory = runner(&program)
        .extract(&container(dir.path()), &dir.path().join("out"))
        .await
        .unwrap();

    let ids: Vec<&str> = inventory.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["loader", "loader.py"]);
    assert!(inventory
        .get(&ScriptId::new("loader.py"))
        .unwrap()
        .source_text
        .contains("os.system"));
}
