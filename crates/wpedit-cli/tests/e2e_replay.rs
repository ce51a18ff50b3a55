//! E2E tests for `wpe replay` and `wpe config`.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn wpe_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wpe"));
    cmd.current_dir(dir);
    cmd.env("WPEDIT_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", dir.join(".user-config"));
    cmd.env_remove("FORMAT");
    cmd
}

fn fixtures() -> Value {
    json!({
        "schemas": [{
            "typeHref": "/api/v3/types/1",
            "fields": {
                "subject": { "writable": true, "required": true, "kind": "text" },
                "assignee": { "writable": true, "kind": "link" },
                "startDate": { "writable": true, "kind": "date" },
                "dueDate": { "writable": true, "kind": "date" }
            }
        }],
        "work_packages": [{
            "id": "1",
            "typeHref": "/api/v3/types/1",
            "attributes": {
                "subject": { "kind": "text", "value": "Draft" },
                "startDate": { "kind": "date", "value": "2024-03-04" },
                "dueDate": { "kind": "date", "value": "2024-03-08" }
            }
        }],
        "attachments": [
            { "work_package": "1", "id": "9", "fileName": "diagram.png" }
        ]
    })
}

fn write_script(dir: &Path, steps: &Value) -> PathBuf {
    let script = json!({
        "fixtures": fixtures(),
        "view": { "date_display_start": "2024-03-01", "pixels_per_day": 20.0 },
        "steps": steps,
    });
    let path = dir.join("session.json");
    fs::write(&path, serde_json::to_vec_pretty(&script).unwrap()).unwrap();
    path
}

fn replay_json(dir: &Path, script: &Path) -> Value {
    let output = wpe_cmd(dir)
        .arg("replay")
        .arg(script)
        .arg("--json")
        .output()
        .expect("replay should not crash");
    assert!(
        output.status.success(),
        "replay failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

#[test]
fn replay_edit_and_save_reports_commit() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        &json!([
            { "op": "set", "id": "1", "attribute": "subject",
              "value": { "kind": "text", "value": "Final" } },
            { "op": "save", "id": "1" }
        ]),
    );

    let report = replay_json(dir.path(), &script);

    assert_eq!(report["failed"], 0);
    assert_eq!(report["steps"][0]["result"], "modified");
    assert_eq!(report["steps"][1]["result"], "committed");
    assert_eq!(report["steps"][1]["lock_version"], 1);
    assert_eq!(report["steps"][1]["changes"]["subject"]["value"], "Final");
    assert_eq!(report["notifications"][0]["kind"], "saved");
    assert_eq!(report["work_packages"][0]["attributes"]["subject"]["value"], "Final");

    let events = report["events"].as_array().expect("events");
    assert!(events.iter().any(|e| e["type"] == "renamed" && e["subject"] == "Final"));
}

#[test]
fn replay_timeline_drag_moves_both_dates() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        &json!([
            { "op": "timeline", "id": "1", "direction": "both",
              "from_x": 70.0, "to_x": 110.0, "rendered": ["1"] },
            { "op": "timeline", "id": "1", "direction": "right",
              "from_x": 200.0, "to_x": 260.0, "escape": true }
        ]),
    );

    let report = replay_json(dir.path(), &script);

    assert_eq!(report["steps"][0]["result"], "committed");
    assert_eq!(report["steps"][0]["changes"]["startDate"]["value"], "2024-03-06");
    assert_eq!(report["steps"][0]["changes"]["dueDate"]["value"], "2024-03-10");
    assert_eq!(report["steps"][1]["result"], "cancelled");
    assert_eq!(report["work_packages"][0]["lockVersion"], 1);
}

#[test]
fn replay_group_drop_and_attachment_removal() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        &json!([
            { "op": "group_drop", "id": "1", "attribute": "assignee", "group": "bob",
              "groups": [
                  { "identifier": "bob", "value": { "kind": "null" },
                    "valueLinks": [{ "href": "/api/v3/users/2" }] }
              ] },
            { "op": "remove_attachment", "id": "1", "attachment": "9" },
            { "op": "remove_attachment", "id": "1", "attachment": "9" }
        ]),
    );

    let report = replay_json(dir.path(), &script);

    assert_eq!(report["steps"][0]["result"], "committed");
    assert_eq!(
        report["steps"][0]["changes"]["assignee"]["value"]["href"],
        "/api/v3/users/2"
    );
    assert_eq!(report["steps"][1]["result"], "removed");
    assert_eq!(report["steps"][2]["result"], "no_change");
}

#[test]
fn strict_replay_fails_when_a_step_fails() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        &json!([
            { "op": "set", "id": "1", "attribute": "subject", "value": { "kind": "null" } },
            { "op": "save", "id": "1" }
        ]),
    );

    let output = wpe_cmd(dir.path())
        .arg("replay")
        .arg(&script)
        .args(["--strict", "--json"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 of 2 step(s) failed"));
    let report: Value = serde_json::from_slice(&output.stdout).expect("report still printed");
    assert_eq!(report["steps"][1]["result"], "failed");
    assert_eq!(report["steps"][1]["code"], "E1001");
}

#[test]
fn non_strict_replay_succeeds_despite_failures() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), &json!([{ "op": "save", "id": "404" }]));

    let report = replay_json(dir.path(), &script);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["steps"][0]["result"], "failed");
}

#[test]
fn replay_human_output_lists_steps() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        &json!([
            { "op": "set", "id": "1", "attribute": "subject",
              "value": { "kind": "text", "value": "Final" } },
            { "op": "reset", "id": "1" }
        ]),
    );

    wpe_cmd(dir.path())
        .env("FORMAT", "human")
        .arg("replay")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("modified [subject]"))
        .stdout(predicate::str::contains("cleared"))
        .stdout(predicate::str::contains("Draft"));
}

#[test]
fn replay_rejects_malformed_script() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, r#"{ "steps": [{ "op": "teleport" }] }"#).unwrap();

    wpe_cmd(dir.path())
        .arg("replay")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse"));
}

#[test]
fn replay_rejects_zero_scale_view() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flat.json");
    let script = json!({
        "fixtures": fixtures(),
        "view": { "date_display_start": "2024-03-01", "pixels_per_day": 0.0 },
        "steps": [
            { "op": "timeline", "id": "1", "direction": "both", "from_x": 70.0, "to_x": 1.0e300 }
        ],
    });
    fs::write(&path, serde_json::to_vec_pretty(&script).unwrap()).unwrap();

    wpe_cmd(dir.path())
        .arg("replay")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("view.pixels_per_day"))
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn config_reports_project_settings() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".wpedit")).unwrap();
    fs::write(
        dir.path().join(".wpedit/config.toml"),
        "[timeline]\npixels_per_day = 12.5\n\n[hooks]\nrefresh_parent = false\n",
    )
    .unwrap();

    let output = wpe_cmd(dir.path())
        .args(["config", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let config: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(config["resolved_output"], "json");
    assert_eq!(config["editor"]["timeline"]["pixels_per_day"], 12.5);
    assert_eq!(config["editor"]["hooks"]["refresh_parent"], false);
    assert_eq!(config["editor"]["hooks"]["publish_events"], true);
}

#[test]
fn config_rejects_non_positive_scale() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".wpedit")).unwrap();
    fs::write(
        dir.path().join(".wpedit/config.toml"),
        "[timeline]\npixels_per_day = 0.0\n",
    )
    .unwrap();

    wpe_cmd(dir.path())
        .args(["config", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pixels_per_day"));
}
