//! CLI integration tests

use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the binary with an isolated HOME so no user config is read
fn carecast(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_carecast"))
        .args(args)
        .env("HOME", home)
        .env_remove("CARECAST_API_URL")
        .env_remove("CARECAST_MODEL_DIR")
        .output()
        .expect("Failed to execute command")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn write_series(dir: &Path, hours: usize) -> PathBuf {
    let path = dir.join("series.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        "timestamp,admissions,discharges,bed_occupancy,oxygen_level,occupancy_rate"
    )
    .unwrap();
    for i in 0..hours {
        let beds = 140 + (i * 3) % 40;
        writeln!(
            file,
            "2024-03-{:02} {:02}:00:00,{},{},{},{:.1},{:.1}",
            4 + i / 24,
            i % 24,
            6 + (i * 7) % 9,
            5 + (i * 5) % 8,
            beds,
            2000.0 - (i % 50) as f64 * 20.0,
            beds as f64 / 2.5
        )
        .unwrap();
    }
    path
}

const SAMPLE_OPTIMIZE: &str = r#"{
    "current_staff": {
        "Nurses": {"Morning": 20, "Evening": 15, "Night": 12},
        "Doctors": {"Morning": 12, "Evening": 10, "Night": 6},
        "Support_Staff": {"Morning": 8, "Evening": 6, "Night": 4}
    },
    "predicted_demand": {"admissions": 14, "bed_occupancy": 180, "oxygen_level": 1200},
    "constraints": {"max_budget": 15000, "min_total_staff": 60}
}"#;

#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    let output = carecast(home.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("CareCast"), "Should show app name");
    assert!(stdout.contains("train"), "Should show train command");
    assert!(stdout.contains("predict"), "Should show predict command");
    assert!(stdout.contains("optimize"), "Should show optimize command");
    assert!(stdout.contains("status"), "Should show status command");
}

#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    let output = carecast(home.path(), &["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("carecast"), "Should show binary name");
}

#[test]
fn test_train_help() {
    let home = TempDir::new().unwrap();
    let output = carecast(home.path(), &["train", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--data"), "Should show data option");
    assert!(stdout.contains("--model-dir"), "Should show model-dir option");
    assert!(stdout.contains("--horizons"), "Should show horizons option");
}

#[test]
fn test_format_and_api_url_options() {
    let home = TempDir::new().unwrap();
    let output = carecast(home.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("CARECAST_API_URL"), "Should show env var");
}

#[test]
fn test_invalid_command() {
    let home = TempDir::new().unwrap();
    let output = carecast(home.path(), &["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error") || stderr.contains("invalid"));
}

#[test]
fn test_missing_argument() {
    let home = TempDir::new().unwrap();
    let output = carecast(home.path(), &["train"]);

    assert!(!output.status.success(), "Missing --data should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("required") || stderr.contains("error"));
}

#[test]
fn test_optimize_sample_request() {
    let home = TempDir::new().unwrap();
    let output = carecast(
        home.path(),
        &["--format", "json", "optimize", "--input", SAMPLE_OPTIMIZE],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let result = stdout_json(&output);
    assert_eq!(result["solver_status"], "heuristic_fallback");
    assert!(result["allocation"]["Nurses"]["Night"].as_u64().unwrap() >= 10);
    assert!(result["allocation"]["Doctors"]["Night"].as_u64().unwrap() >= 5);
}

#[test]
fn test_optimize_table_output() {
    let home = TempDir::new().unwrap();
    let input = home.path().join("request.json");
    std::fs::write(&input, SAMPLE_OPTIMIZE).unwrap();

    let output = carecast(home.path(), &["optimize", "--input", input.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Staff Allocation"));
    assert!(stdout.contains("Support_Staff"));
    assert!(stdout.contains("Recommendations"));
}

#[test]
fn test_optimize_rejects_invalid_demand() {
    let home = TempDir::new().unwrap();
    let output = carecast(
        home.path(),
        &[
            "optimize",
            "--input",
            r#"{"current_staff": {}, "predicted_demand": {"admissions": -1}}"#,
        ],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("validation failed"));
}

#[test]
fn test_train_then_predict() {
    let home = TempDir::new().unwrap();
    let data = write_series(home.path(), 120);
    let model_dir = home.path().join("models");

    let output = carecast(
        home.path(),
        &[
            "--format",
            "json",
            "train",
            "--data",
            data.to_str().unwrap(),
            "--model-dir",
            model_dir.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report = stdout_json(&output);
    assert_eq!(report["trained"].as_array().unwrap().len(), 9);
    assert!(model_dir.join("metadata.json").is_file());

    let state = r#"{"timestamp": "2024-03-09T00:00:00Z", "admissions": 9, "discharges": 7,
        "bed_occupancy": 150, "oxygen_level": 1500.0, "occupancy_rate": 60.0}"#;
    let output = carecast(
        home.path(),
        &[
            "--format",
            "json",
            "predict",
            "--model-dir",
            model_dir.to_str().unwrap(),
            "--state",
            state,
            "--history",
            data.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let outcome = stdout_json(&output);
    assert_eq!(outcome["sources"]["admissions_next_1h"], "model");
    assert_eq!(outcome["model_version"], report["version"]);
    assert!(outcome["forecast"]["bed_occupancy"]["24h"].as_f64().unwrap() >= 0.0);
}

#[test]
fn test_predict_without_models_carries_forward() {
    let home = TempDir::new().unwrap();
    let model_dir = home.path().join("absent");
    let state = r#"{"timestamp": "2024-03-09T00:00:00Z", "admissions": 9, "discharges": 7,
        "bed_occupancy": 150, "oxygen_level": 1500.0, "occupancy_rate": 60.0}"#;

    let output = carecast(
        home.path(),
        &[
            "--format",
            "json",
            "predict",
            "--model-dir",
            model_dir.to_str().unwrap(),
            "--state",
            state,
            "--horizons",
            "6",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let outcome = stdout_json(&output);
    assert_eq!(outcome["forecast"]["admissions"]["6h"], 9.0);
    assert_eq!(outcome["sources"]["admissions_next_6h"], "carry_forward");
}

#[test]
fn test_status_against_agent() {
    let home = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    let health = server
        .mock("GET", "/healthz")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"status": "degraded", "model_version": "untrained",
                "components": {"registry": {"status": "degraded", "message": "no trained models", "checked_at": 0}}}"#,
        )
        .create();
    let models = server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"version": "untrained", "trained_at": null, "feature_count": 0, "models": []}"#)
        .create();

    let output = carecast(
        home.path(),
        &["--format", "json", "--api-url", &server.url(), "status"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let status = stdout_json(&output);
    assert_eq!(status["health"]["status"], "degraded");
    assert_eq!(status["models"]["version"], "untrained");

    health.assert();
    models.assert();
}

#[test]
fn test_status_fails_when_unhealthy() {
    let home = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    let _health = server
        .mock("GET", "/healthz")
        .with_status(503)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"status": "unhealthy",
                "components": {"forecaster": {"status": "unhealthy", "message": "startup training failed", "checked_at": 0}}}"#,
        )
        .create();
    let _models = server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"version": "untrained", "feature_count": 0, "models": []}"#)
        .create();

    let output = carecast(home.path(), &["--api-url", &server.url(), "status"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unhealthy"));
}

#[test]
fn test_status_table_lists_top_features() {
    let home = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    let _health = server
        .mock("GET", "/healthz")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status": "healthy", "model_version": "v1", "components": {}}"#)
        .create();
    let _models = server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"version": "v1", "feature_count": 38, "models": [{
                "name": "admissions_next_1h", "backend": "ridge", "mae": 1.5, "rmse": 2.0,
                "train_rows": 80, "test_rows": 20,
                "top_features": [
                    {"feature": "admissions_lag_1", "importance": 3.2},
                    {"feature": "hour", "importance": 1.1},
                    {"feature": "is_night", "importance": 0.7},
                    {"feature": "month", "importance": 0.1}
                ]}]}"#,
        )
        .create();

    let output = carecast(home.path(), &["--api-url", &server.url(), "status"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Top features"));
    assert!(stdout.contains("admissions_lag_1, hour, is_night"));
    assert!(!stdout.contains("month"));
}
