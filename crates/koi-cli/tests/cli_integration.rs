//! CLI integration tests for the `koi` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fmt::Write as _;
use std::path::Path;
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

fn koi() -> Command {
    let mut cmd = Command::cargo_bin("koi").expect("koi binary");
    cmd.arg("--quiet");
    cmd
}

/// Labelled KOI-style CSV with 20 rows per class, separated by `koi_period`.
fn write_training_csv(path: &Path) {
    let labels = ["FALSE POSITIVE", "CONFIRMED", "CANDIDATE"];
    let mut csv = String::from("# cumulative KOI export\nkepid,koi_disposition,koi_period,koi_depth\n");
    for i in 0..60 {
        let class = i % 3;
        let depth = if i % 9 == 0 {
            String::new()
        } else {
            ((i * 13) % 7).to_string()
        };
        writeln!(
            csv,
            "{},{},{},{}",
            100_000 + i,
            labels[class],
            class as f64 * 10.0 + (i / 3) as f64 * 0.1,
            depth
        )
        .expect("write row");
    }
    std::fs::write(path, csv).expect("write csv");
}

/// Configuration with small forests so the tests stay fast.
fn write_config(path: &Path) {
    let config = r#"{
        "gbm_exact": {"n_estimators": 10, "learning_rate": 0.1, "max_depth": 3,
                      "min_samples_leaf": 1, "max_bins": null, "subsample": 1.0},
        "gbm_histogram": {"n_estimators": 10, "learning_rate": 0.1, "max_depth": 3,
                          "min_samples_leaf": 5, "max_bins": 32, "subsample": 0.8},
        "forest": {"n_estimators": 10, "max_depth": null, "min_samples_leaf": 1,
                   "max_features": "sqrt"}
    }"#;
    std::fs::write(path, config).expect("write config");
}

/// Trains into a fresh directory and returns it; artifacts live in `artifacts/`.
fn trained() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = dir.path().join("koi.csv");
    let config = dir.path().join("config.json");
    write_training_csv(&data);
    write_config(&config);

    koi()
        .args(["train", "--data"])
        .arg(&data)
        .arg("--out")
        .arg(dir.path().join("artifacts"))
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("weighted avg"));
    dir
}

// ============================================================================
// Help
// ============================================================================

#[test]
fn test_help_lists_subcommands() {
    koi()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("train"))
        .stdout(predicate::str::contains("predict"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("inspect"));
}

// ============================================================================
// Train / predict
// ============================================================================

#[test]
fn test_train_writes_artifacts() {
    let dir = trained();
    for file in [
        "model_columns.json",
        "imputer.safetensors",
        "scaler.safetensors",
        "stacking_model.bin",
    ] {
        assert!(dir.path().join("artifacts").join(file).is_file(), "{file}");
    }
}

#[test]
fn test_predict_json_output() {
    let dir = trained();
    let output = koi()
        .args(["--json", "predict", "--artifacts"])
        .arg(dir.path().join("artifacts"))
        .args(["--record", r#"{"koi_period": 20.5, "koi_depth": 3, "kepoi_name": "K1"}"#])
        .output()
        .expect("run");
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["prediction"], "CANDIDATE");
    let confidence = value["confidence"].as_str().expect("string");
    assert!(confidence.ends_with('%'));
    assert_eq!(confidence.split('.').nth(1).map(str::len), Some(3));
}

#[test]
fn test_predict_record_from_file() {
    let dir = trained();
    let record = dir.path().join("record.json");
    std::fs::write(&record, r#"{"koi_period": 0.5, "koi_depth": null}"#).expect("write");

    koi()
        .args(["predict", "--artifacts"])
        .arg(dir.path().join("artifacts"))
        .arg("--record")
        .arg(format!("@{}", record.display()))
        .assert()
        .success()
        .stdout(predicate::str::contains("FALSE POSITIVE"));
}

#[test]
fn test_predict_missing_column_exit_code() {
    let dir = trained();
    koi()
        .args(["predict", "--artifacts"])
        .arg(dir.path().join("artifacts"))
        .args(["--record", r#"{"koi_prad": 1.0}"#])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("koi_period"))
        .stderr(predicate::str::contains("koi_depth"));
}

#[test]
fn test_predict_invalid_json_exit_code() {
    let dir = trained();
    koi()
        .args(["predict", "--artifacts"])
        .arg(dir.path().join("artifacts"))
        .args(["--record", "not json"])
        .assert()
        .code(4);
}

// ============================================================================
// Batch
// ============================================================================

#[test]
fn test_batch_reports_failed_rows() {
    let dir = trained();
    let input = dir.path().join("rows.csv");
    std::fs::write(
        &input,
        "id,koi_period,koi_depth\nk1,0.2,1\nk2,abc,1\nk3,10.4,\n",
    )
    .expect("write");
    let report_file = dir.path().join("report.json");

    let output = koi()
        .args(["--json", "batch", "--artifacts"])
        .arg(dir.path().join("artifacts"))
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&report_file)
        .output()
        .expect("run");
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["total_processed"], 3);
    assert_eq!(value["successful"], 2);
    assert_eq!(value["results"][1]["id"], "k2");
    assert_eq!(value["results"][1]["prediction"], "ERROR");
    assert_eq!(value["results"][1]["confidence"], "0.00%");
    assert_eq!(value["results"][1]["status"], "error");

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_file).expect("read")).expect("json");
    assert_eq!(saved, value);
}

#[test]
fn test_batch_missing_column_fails_whole_request() {
    let dir = trained();
    let input = dir.path().join("rows.csv");
    std::fs::write(&input, "koi_period\n1.0\n").expect("write");

    koi()
        .args(["batch", "--artifacts"])
        .arg(dir.path().join("artifacts"))
        .arg("--input")
        .arg(&input)
        .assert()
        .code(5)
        .stderr(predicate::str::contains("koi_depth"));
}

// ============================================================================
// Inspect / explain / artifact errors
// ============================================================================

#[test]
fn test_inspect_json_summary() {
    let dir = trained();
    let output = koi()
        .args(["--json", "inspect", "--artifacts"])
        .arg(dir.path().join("artifacts"))
        .output()
        .expect("run");
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["n_features"], 2);
    assert_eq!(value["features"][0]["name"], "koi_period");
    assert_eq!(
        value["estimators"],
        serde_json::json!(["gbm_exact", "gbm_histogram", "random_forest"])
    );
}

#[test]
fn test_explain_renders_prompt() {
    let dir = trained();
    koi()
        .args(["explain", "--artifacts"])
        .arg(dir.path().join("artifacts"))
        .args(["--record", r#"{"koi_period": 10.2, "koi_depth": 4}"#])
        .args(["--question", "What is koi_period?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exo-Chat"))
        .stdout(predicate::str::contains("What is koi_period?"));
}

#[test]
fn test_missing_artifact_directory_exit_code() {
    koi()
        .args(["inspect", "--artifacts", "/nonexistent/koi-artifacts"])
        .assert()
        .code(3);
}

#[test]
fn test_corrupt_artifact_exit_code() {
    let dir = trained();
    let artifacts = dir.path().join("artifacts");
    std::fs::write(artifacts.join("stacking_model.bin"), b"garbage").expect("write");

    koi()
        .args(["inspect", "--artifacts"])
        .arg(&artifacts)
        .assert()
        .code(6)
        .stderr(predicate::str::contains("stacking_model.bin"));
}
