//! Integration tests for the qcheck CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to get a qcheck command isolated from the user's config
fn qcheck(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("qcheck").unwrap();
    cmd.current_dir(tmp.path())
        .env("HOME", tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join(".config"))
        .env_remove("QCHECK_PASS_FAIL_ONLY")
        .env_remove("QCHECK_COMMENT_ON_SKIP")
        .env_remove("QCHECK_FORMAT")
        .env_remove("QCHECK_LOG");
    cmd
}

const SESSION: &str = r#"
session_id: tli-7
meta:
  test_list_name: Daily Output
  unit_number: 3
  username: jdoe
measurements:
  - id: 1
    slug: temp
    name: Temperature
    category: env
    type: simple
    reference: { value: 20 }
    tolerance: { type: absolute, act_low: -2, tol_low: -1, tol_high: 1, act_high: 2 }
  - id: 2
    slug: pressure
    name: Pressure
    category: env
    type: simple
    reference: { value: 100 }
    tolerance: { type: percent, act_low: -2, tol_low: -1, tol_high: 1, act_high: 2 }
  - id: 3
    slug: door
    name: Door interlock
    category: safety
    type: boolean
    reference: { type: boolean, value: 1 }
  - id: 4
    slug: ratio
    name: Ratio
    category: env
    type: composite
    reference: { value: 0.2 }
    tolerance: { type: absolute, act_low: -0.1, tol_low: -0.05, tol_high: 0.05, act_high: 0.1 }
  - id: 5
    slug: grade
    name: Beam grade
    category: safety
    type: multchoice
    choices: [A, B, C]
    tolerance: { type: multchoice, mc_pass_choices: "A", mc_tol_choices: "B" }
  - id: 6
    slug: photo
    name: Setup photo
    category: safety
    type: upload
values:
  temp:
    value: 20.4
  pressure:
    value: 100.5
composite_results:
  ratio:
    value: 0.21
"#;

/// Write the standard session into a temp dir
fn setup_session() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("session.yaml");
    fs::write(&path, SESSION).unwrap();
    (tmp, path)
}

/// Run `eval` with JSON output and parse the report
fn eval_json(tmp: &TempDir, extra: &[&str]) -> Value {
    let output = qcheck(tmp)
        .args(["eval", "session.yaml", "--format", "json"])
        .args(extra)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "eval failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn measurement<'a>(report: &'a Value, slug: &str) -> &'a Value {
    report["measurements"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["slug"] == slug)
        .unwrap_or_else(|| panic!("no measurement {}", slug))
}

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("eval"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_version_displays() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("qcheck"));
}

#[test]
fn test_unknown_command_fails() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp).arg("frobnicate").assert().failure();
}

// ============================================================================
// Eval Tests
// ============================================================================

#[test]
fn test_eval_table_output() {
    let (tmp, _) = setup_session();
    qcheck(&tmp)
        .args(["eval", "session.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("temp"))
        .stdout(predicate::str::contains("OK (0.40)"))
        .stdout(predicate::str::contains("OK (0.5%)"))
        .stdout(predicate::str::contains("No failing measurements"));
}

#[test]
fn test_eval_json_statuses() {
    let (tmp, _) = setup_session();
    let report = eval_json(&tmp, &[]);

    assert_eq!(report["has_failing"], false);
    assert_eq!(measurement(&report, "temp")["status"], "ok");
    assert_eq!(measurement(&report, "door")["status"], "not_done");
    assert_eq!(measurement(&report, "grade")["status"], "not_done");
}

#[test]
fn test_eval_applies_composite_results() {
    let (tmp, _) = setup_session();
    let report = eval_json(&tmp, &[]);

    let ratio = measurement(&report, "ratio");
    assert_eq!(ratio["value"], 0.21);
    assert_eq!(ratio["status"], "ok");
    assert_eq!(report["submission_enabled"], true);
}

#[test]
fn test_eval_set_value_to_action() {
    let (tmp, _) = setup_session();
    let report = eval_json(&tmp, &["--set", "temp=25", "--set", "door=no"]);

    assert_eq!(report["has_failing"], true);
    let temp = measurement(&report, "temp");
    assert_eq!(temp["status"], "action");
    assert_eq!(temp["message"], "Action (5.00)");
    assert_eq!(measurement(&report, "door")["status"], "action");
}

#[test]
fn test_eval_multiple_choice_tolerance() {
    let (tmp, _) = setup_session();
    let report = eval_json(&tmp, &["--set", "grade=B"]);
    assert_eq!(measurement(&report, "grade")["status"], "tolerance");
}

#[test]
fn test_eval_fail_on_action() {
    let (tmp, _) = setup_session();
    qcheck(&tmp)
        .args(["eval", "session.yaml", "--set", "temp=25", "--fail-on-action"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("action level"));
}

#[test]
fn test_eval_fail_on_action_passes_when_clean() {
    let (tmp, _) = setup_session();
    qcheck(&tmp)
        .args(["eval", "session.yaml", "--fail-on-action", "--quiet"])
        .assert()
        .success();
}

#[test]
fn test_eval_pass_fail_only() {
    let (tmp, _) = setup_session();
    let report = eval_json(&tmp, &["--set", "temp=20.5", "--pass-fail-only"]);
    assert_eq!(measurement(&report, "temp")["message"], "OK");

    let report = eval_json(&tmp, &["--set", "temp=30", "--pass-fail-only"]);
    assert_eq!(measurement(&report, "temp")["message"], "Fail");
}

#[test]
fn test_eval_category_filter_hides_others() {
    let (tmp, _) = setup_session();
    let report = eval_json(&tmp, &["--categories", "safety", "--set", "temp=30"]);

    let temp = measurement(&report, "temp");
    assert_eq!(temp["state"], "hidden");
    assert_eq!(temp["status"], "not_done");
    assert_eq!(temp["comment"], "Category not performed");
    assert_eq!(temp["value"], 30.0);
    // hidden measurements keep counting towards the aggregate
    assert_eq!(report["has_failing"], true);
    assert_eq!(measurement(&report, "door")["state"], "active");
}

#[test]
fn test_eval_skip_requires_comment() {
    let (tmp, _) = setup_session();
    fs::write(
        tmp.path().join(".qcheck.yaml"),
        "require_comment_on_skip: true\n",
    )
    .unwrap();

    let report = eval_json(&tmp, &["--skip", "door"]);
    assert_eq!(measurement(&report, "door")["state"], "skipped");
    assert!(report["missing_comments"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s == "door"));

    let report = eval_json(&tmp, &["--skip", "door", "--comment", "door=interlock offline"]);
    assert!(report["missing_comments"].as_array().unwrap().is_empty());
}

#[test]
fn test_eval_unknown_slug_fails() {
    let (tmp, _) = setup_session();
    qcheck(&tmp)
        .args(["eval", "session.yaml", "--set", "ghost=1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn test_eval_read_only_measurement_rejected() {
    let (tmp, _) = setup_session();
    qcheck(&tmp)
        .args(["eval", "session.yaml", "--set", "ratio=1"])
        .assert()
        .failure();
}

#[test]
fn test_eval_bad_assignment_fails() {
    let (tmp, _) = setup_session();
    qcheck(&tmp)
        .args(["eval", "session.yaml", "--set", "temp"])
        .assert()
        .failure();
}

#[test]
fn test_eval_attach_upload() {
    let (tmp, _) = setup_session();
    fs::write(tmp.path().join("setup.png"), b"png").unwrap();

    let report = eval_json(&tmp, &["--attach", "photo=setup.png"]);
    assert_eq!(measurement(&report, "photo")["status"], "done");
}

#[test]
fn test_eval_attach_missing_file_fails() {
    let (tmp, _) = setup_session();
    qcheck(&tmp)
        .args(["eval", "session.yaml", "--attach", "photo=missing.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read attachment"));
}

#[test]
fn test_eval_submission_payload() {
    let (tmp, _) = setup_session();
    let output = qcheck(&tmp)
        .args([
            "eval",
            "session.yaml",
            "--submission",
            "--format",
            "json",
            "--categories",
            "env",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let entries: Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 6);
    let door = entries.iter().find(|e| e["slug"] == "door").unwrap();
    assert_eq!(door["skipped"], true);
    assert!(door["value"].is_null());
    let temp = entries.iter().find(|e| e["slug"] == "temp").unwrap();
    assert_eq!(temp["value"], 20.4);
}

#[test]
fn test_eval_session_options_override() {
    let tmp = TempDir::new().unwrap();
    let session = SESSION.replacen(
        "measurements:",
        "options:\n  pass_fail_only: true\nmeasurements:",
        1,
    );
    fs::write(tmp.path().join("session.yaml"), session).unwrap();

    let report = eval_json(&tmp, &[]);
    assert_eq!(measurement(&report, "temp")["message"], "OK");
}

#[test]
fn test_eval_local_config_format() {
    let (tmp, _) = setup_session();
    fs::write(tmp.path().join(".qcheck.yaml"), "default_format: json\n").unwrap();

    let output = qcheck(&tmp).args(["eval", "session.yaml"]).output().unwrap();
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["has_failing"], false);
}

#[test]
fn test_eval_custom_labels_from_config() {
    let (tmp, _) = setup_session();
    fs::write(
        tmp.path().join(".qcheck.yaml"),
        "status_display:\n  action: ACT\n",
    )
    .unwrap();

    let report = eval_json(&tmp, &["--set", "temp=25"]);
    assert_eq!(measurement(&report, "temp")["message"], "ACT (5.00)");
}

#[test]
fn test_eval_env_pass_fail_only() {
    let (tmp, _) = setup_session();
    let output = qcheck(&tmp)
        .env("QCHECK_PASS_FAIL_ONLY", "true")
        .args(["eval", "session.yaml", "--format", "json", "--set", "temp=25"])
        .output()
        .unwrap();
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(measurement(&report, "temp")["message"], "Fail");
}

#[test]
fn test_eval_invalid_yaml_reports_diagnostic() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("session.yaml"), "measurements: [\n  - id: 1\n").unwrap();
    qcheck(&tmp)
        .args(["eval", "session.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("session.yaml"));
}

#[test]
fn test_eval_missing_file() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .args(["eval", "nope.yaml"])
        .assert()
        .failure();
}

#[test]
fn test_eval_csv_output() {
    let (tmp, _) = setup_session();
    qcheck(&tmp)
        .args(["eval", "session.yaml", "--format", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("slug,name,category"));
}

#[test]
fn test_eval_markdown_output() {
    let (tmp, _) = setup_session();
    qcheck(&tmp)
        .args(["eval", "session.yaml", "--format", "md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("| temp"));
}

// ============================================================================
// Check Tests
// ============================================================================

#[test]
fn test_check_within_tolerance() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .args([
            "check", "10.5", "-r", "10", "--al", "-2", "--tl", "-1", "--th", "1", "--ah", "2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK (0.50)"));
}

#[test]
fn test_check_on_tolerance_bound() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .args([
            "check", "11", "-r", "10", "--al", "-2", "--tl", "-1", "--th", "1", "--ah", "2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tolerance (1.00)"));
}

#[test]
fn test_check_percent_zero_reference() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .args(["check", "1", "-r", "0", "-m", "percent", "--tl", "-1", "--th", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Action (Zero ref with % diff tol)"));
}

#[test]
fn test_check_boolean_mismatch() {
    let tmp = TempDir::new().unwrap();
    let output = qcheck(&tmp)
        .args(["check", "no", "--kind", "boolean", "-r", "1", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "action");
}

#[test]
fn test_check_multiple_choice() {
    let tmp = TempDir::new().unwrap();
    let output = qcheck(&tmp)
        .args([
            "check", "C", "--kind", "multchoice", "--pass", "A,B", "--tol-choices", "C",
            "--format", "json",
        ])
        .output()
        .unwrap();
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "tolerance");
}

#[test]
fn test_check_no_tolerance() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .args(["check", "42", "-r", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No Tol Set"));
}

#[test]
fn test_check_unparseable_value_not_done() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .args(["check", "1.2.3", "-r", "1", "--tl", "-1", "--th", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not Done"));
}

// ============================================================================
// Tol Tests
// ============================================================================

#[test]
fn test_tol_valid_with_limits() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .args(["tol", "--tl", "-1", "--th", "1", "-r", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tolerance is valid"))
        .stdout(predicate::str::contains("11.000"));
}

#[test]
fn test_tol_misordered_bounds_fail() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .args(["tol", "--tl", "1", "--th", "-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("problem"));
}

#[test]
fn test_tol_mixed_choice_fails() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .args(["tol", "-m", "multchoice", "--pass", "A", "--tl", "-1"])
        .assert()
        .failure();
}

// ============================================================================
// Validate Tests
// ============================================================================

#[test]
fn test_validate_clean_session() {
    let (tmp, _) = setup_session();
    qcheck(&tmp)
        .args(["validate", "session.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All files passed validation"));
}

#[test]
fn test_validate_reports_errors() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("bad.yaml"),
        r#"
measurements:
  - { id: 1, slug: temp, name: Temp, category: env, type: simple,
      reference: { value: 1 }, tolerance: { type: absolute, tol_low: 1, tol_high: -1 } }
  - { id: 2, slug: temp, name: Again, category: env, type: simple }
"#,
    )
    .unwrap();

    qcheck(&tmp)
        .args(["validate", "bad.yaml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("duplicate slug"));
}

#[test]
fn test_validate_strict_promotes_warnings() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("warn.yaml"),
        r#"
measurements:
  - { id: 1, slug: temp, name: Temp, category: env, type: simple }
values:
  ghost: { value: 1 }
"#,
    )
    .unwrap();

    qcheck(&tmp).args(["validate", "warn.yaml"]).assert().success();
    qcheck(&tmp)
        .args(["validate", "--strict", "warn.yaml"])
        .assert()
        .failure();
}

// ============================================================================
// Completions Tests
// ============================================================================

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();
    qcheck(&tmp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("qcheck"));
}
