use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn tanpopo(event_name: &str, event_path: &std::path::Path) -> Command {
    let mut command = Command::cargo_bin("tanpopo").expect("binary");
    command
        .env_remove("BOT_GEMINI_API_KEY")
        .env_remove("TANPOPO_BOT_LOGIN")
        .env("RUST_LOG", "info")
        .args(["--event-name", event_name])
        .arg("--event-path")
        .arg(event_path)
        .args([
            "--repository",
            "octo/tasks",
            "--actor",
            "alice",
            "--run-id",
            "7",
            "--token",
            "ghs_integration_token",
            "--api-url",
            "http://127.0.0.1:9",
            "--retry-max-attempts",
            "1",
        ]);
    command
}

#[test]
fn integration_unrecognized_event_masks_token_and_exits_cleanly() {
    let temp = tempdir().expect("tempdir");
    let event = temp.path().join("event.json");
    std::fs::write(&event, r#"{"ref":"refs/heads/main"}"#).expect("event");

    tanpopo("push", &event)
        .assert()
        .success()
        .stdout(predicate::str::contains("::add-mask::ghs_integration_token"))
        .stdout(predicate::str::contains(
            "::add-mask::eC1hY2Nlc3MtdG9rZW46Z2hzX2ludGVncmF0aW9uX3Rva2Vu",
        ))
        .stderr(predicate::str::contains("nothing to do for event"));
}

#[test]
fn regression_malformed_payload_fails_the_run() {
    let temp = tempdir().expect("tempdir");
    let event = temp.path().join("event.json");
    std::fs::write(&event, r#"{"action":"opened"}"#).expect("event");

    tanpopo("issues", &event)
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed issues payload"));
}

#[test]
fn regression_missing_event_file_fails_the_run() {
    let temp = tempdir().expect("tempdir");

    tanpopo("issues", &temp.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read event payload"));
}
