#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn reelpipe(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("reelpipe").unwrap();
    cmd.current_dir(dir.path())
        .env("REELPIPE_ROOT", dir.path())
        .env_remove("REELPIPE_SPREADSHEET_ID")
        .env_remove("REELPIPE_WEBHOOK_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn init_config(dir: &TempDir) {
    reelpipe(dir).args(["config", "init"]).assert().success();
}

const VALID_CAPTION: &str =
    r#"{"title":"Sunset surf","description":"Evening session","tags":["surf","sunset"]}"#;

// ---------------------------------------------------------------------------
// reelpipe config
// ---------------------------------------------------------------------------

#[test]
fn config_init_writes_template() {
    let dir = TempDir::new().unwrap();
    reelpipe(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reelpipe.yaml"));

    let content = std::fs::read_to_string(dir.path().join("reelpipe.yaml")).unwrap();
    assert!(content.contains("instagram_urls"));
    assert!(content.contains("spreadsheet_id"));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    reelpipe(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    reelpipe(&dir)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn config_validate_reports_missing_spreadsheet() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    reelpipe(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stdout(predicate::str::contains("sheets.spreadsheet_id"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn config_validate_accepts_env_override() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    reelpipe(&dir)
        .env("REELPIPE_SPREADSHEET_ID", "sheet-123")
        .args(["config", "validate"])
        .assert()
        .success();
}

#[test]
fn config_validate_json_lists_warnings() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    let out = reelpipe(&dir)
        .args(["--json", "config", "validate"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let warnings = value["warnings"].as_array().unwrap();
    assert!(warnings
        .iter()
        .any(|w| w["level"] == "error" && w["message"].as_str().unwrap().contains("spreadsheet_id")));
}

#[test]
fn config_show_includes_env_override() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    let out = reelpipe(&dir)
        .env("REELPIPE_SPREADSHEET_ID", "sheet-xyz")
        .args(["config", "show", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["sheets"]["spreadsheet_id"], "sheet-xyz");
    assert_eq!(value["sheets"]["worksheet"], "Sheet1");
}

#[test]
fn custom_config_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("other.yaml");
    reelpipe(&dir)
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());
    assert!(!dir.path().join("reelpipe.yaml").exists());
}

// ---------------------------------------------------------------------------
// Required config is checked before any network access
// ---------------------------------------------------------------------------

#[test]
fn scrape_without_config_fails() {
    let dir = TempDir::new().unwrap();
    reelpipe(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("config not found"))
        .stderr(predicate::str::contains("reelpipe config init"));
}

#[test]
fn status_without_spreadsheet_id_fails() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    reelpipe(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("sheets.spreadsheet_id"));
}

#[test]
fn descriptions_without_spreadsheet_id_fails() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);
    reelpipe(&dir)
        .arg("descriptions")
        .assert()
        .failure()
        .stderr(predicate::str::contains("sheets.spreadsheet_id"));
}

#[test]
fn full_without_profiles_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("reelpipe.yaml"),
        "sheets:\n  spreadsheet_id: abc\nsources:\n  instagram_urls: []\n",
    )
    .unwrap();
    reelpipe(&dir)
        .arg("full")
        .assert()
        .failure()
        .stderr(predicate::str::contains("sources.instagram_urls"));
}

// ---------------------------------------------------------------------------
// reelpipe mark
// ---------------------------------------------------------------------------

#[test]
fn mark_rejects_unknown_status() {
    let dir = TempDir::new().unwrap();
    reelpipe(&dir)
        .args(["mark", "ABC123", "done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid status 'done'"));
}

#[test]
fn mark_valid_status_still_needs_config() {
    let dir = TempDir::new().unwrap();
    reelpipe(&dir)
        .args(["mark", "ABC123", "Completed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config not found"));
}

// ---------------------------------------------------------------------------
// reelpipe caption check
// ---------------------------------------------------------------------------

#[test]
fn caption_check_reads_stdin() {
    let dir = TempDir::new().unwrap();
    reelpipe(&dir)
        .args(["caption", "check"])
        .write_stdin(VALID_CAPTION)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: Sunset surf"));
}

#[test]
fn caption_check_reads_file_with_output_wrapper() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("caption.json");
    std::fs::write(&path, format!(r#"{{"output":{VALID_CAPTION}}}"#)).unwrap();
    let out = reelpipe(&dir)
        .args(["--json", "caption", "check"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["title"], "Sunset surf");
    assert_eq!(value["tags"][1], "sunset");
}

#[test]
fn caption_check_rejects_long_title() {
    let dir = TempDir::new().unwrap();
    let caption = serde_json::json!({
        "title": "x".repeat(101),
        "description": "d",
        "tags": ["a"],
    });
    reelpipe(&dir)
        .args(["caption", "check"])
        .write_stdin(caption.to_string())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid caption"));
}

#[test]
fn caption_check_rejects_non_json() {
    let dir = TempDir::new().unwrap();
    reelpipe(&dir)
        .args(["caption", "check"])
        .write_stdin("title: nope")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not JSON"));
}

// ---------------------------------------------------------------------------
// reelpipe notify
// ---------------------------------------------------------------------------

#[test]
fn notify_needs_resume_url() {
    let dir = TempDir::new().unwrap();
    reelpipe(&dir)
        .args(["notify", "--url", "https://www.instagram.com/reel/ABC123/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("webhook.url"));
}

#[test]
fn notify_rejects_non_reel_url() {
    let dir = TempDir::new().unwrap();
    reelpipe(&dir)
        .args([
            "notify",
            "--url",
            "https://www.instagram.com/someone/",
            "--resume-url",
            "http://localhost:5678/webhook-waiting/1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a reel URL"));
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

#[test]
fn help_lists_commands() {
    let dir = TempDir::new().unwrap();
    reelpipe(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("descriptions"))
        .stdout(predicate::str::contains("uploads"))
        .stdout(predicate::str::contains("notify"))
        .stdout(predicate::str::contains("--fast"));
}
