#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn run_json(data: &Path, args: &[&str]) -> Value {
    let output = cargo_bin_cmd!("foodshare")
        .arg("--data-dir")
        .arg(data)
        .env_remove("FOODSHARE_CONFIG")
        .args(["--config", "/nonexistent/foodshare.toml", "--format", "json"])
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json reply")
}

fn run_failing(data: &Path, args: &[&str]) -> String {
    let output = cargo_bin_cmd!("foodshare")
        .arg("--data-dir")
        .arg(data)
        .args(["--config", "/nonexistent/foodshare.toml"])
        .args(args)
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    String::from_utf8_lossy(&output).into_owned()
}

fn has_error_line(stderr: &str, code: &str) -> bool {
    let prefix = format!("error: {code}: ");
    stderr.lines().any(|line| line.starts_with(&prefix))
}

#[test]
fn register_login_and_food_flow() {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path();

    let reply = run_json(data, &["register", "dana", "pw", "donor"]);
    assert_eq!(reply["reply"], "registered");
    let reply = run_json(data, &["login", "dana", "pw"]);
    assert_eq!(reply["role"], "donor");

    let reply = run_json(data, &["add-food", "dana", "bread", "3", "market"]);
    let id = reply["id"].as_str().expect("food id").to_string();
    let reply = run_json(data, &["list-food"]);
    assert_eq!(reply["offers"][0]["id"], id.as_str());
    assert_eq!(reply["offers"][0]["status"], "available");

    run_json(data, &["claim-food", &id, "eli"]);
    let reply = run_json(data, &["list-food"]);
    assert_eq!(reply["offers"].as_array().map(Vec::len), Some(0));

    let food = fs::read_to_string(data.join("food.txt")).expect("food.txt");
    assert_eq!(food, format!("{id}|dana|bread|3|market|claimed|eli\n"));
}

#[test]
fn exec_accepts_field_maps() {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path();

    let reply = run_json(
        data,
        &["exec", "addRequest", "receiver=alice", "foodType=rice", "qty=2"],
    );
    let id = reply["id"].as_str().expect("request id").to_string();
    let request_id = format!("requestId={id}");
    run_json(data, &["exec", "fulfillRequest", &request_id, "donor=bob"]);

    let reply = run_json(data, &["exec", "list_requests"]);
    assert_eq!(reply["requests"][0]["status"], "fulfilled");
    assert_eq!(reply["requests"][0]["fulfilledBy"], "bob");
}

#[test]
fn failures_print_code_and_exit_nonzero() {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path();
    run_json(data, &["register", "dana", "pw", "donor"]);

    let stderr = run_failing(data, &["login", "dana", "wrong"]);
    assert!(has_error_line(&stderr, "unauthorized"), "{stderr}");

    let stderr = run_failing(data, &["fulfill-request", "deadbeef", "bob"]);
    assert!(has_error_line(&stderr, "not_found"), "{stderr}");

    let stderr = run_failing(data, &["exec", "teleport", "x=1"]);
    assert!(has_error_line(&stderr, "invalid"), "{stderr}");
}

#[test]
fn stats_reports_each_collection() {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path();
    run_json(data, &["register", "dana", "pw", "donor"]);
    run_json(data, &["add-request", "alice", "rice", "2"]);
    fs::write(
        data.join("food.txt"),
        "garbage\nabcd1234|dana|soup|1|hall|available\n",
    )
    .expect("seed food");

    let report = run_json(data, &["stats"]);
    assert_eq!(report["users"]["records"], 1);
    assert_eq!(report["requests"]["by_status"]["pending"], 1);
    assert_eq!(report["food_offers"]["records"], 1);
    assert_eq!(report["food_offers"]["skipped_lines"], 1);
    assert_eq!(report["locks"]["throttle"]["in_use"], 0);
}

#[test]
fn config_file_supplies_store_options() {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path().join("from-config");
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        format!(
            "log_level = \"warn\"\n\n[store]\ndata_dir = {:?}\nid_len = 16\nsync_writes = false\n",
            data.display().to_string()
        ),
    )
    .expect("write config");

    let output = cargo_bin_cmd!("foodshare")
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "add-request", "alice", "rice", "2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let reply: Value = serde_json::from_slice(&output).expect("json reply");
    assert_eq!(reply["id"].as_str().map(str::len), Some(16));
    assert!(data.join("requests.txt").exists());
}
