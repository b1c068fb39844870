//! Tests for the training procedure.

use super::*;
use crate::data::RawValue;

/// A labelled KOI-like table, `per_class` rows per disposition.
///
/// `koi_period` separates the classes, `koi_depth` is noise with gaps,
/// `koi_comment` is text and `kepid` is an identifier.
fn koi_table(per_class: usize) -> RawTable {
    let headers = [
        "kepid",
        "koi_disposition",
        "koi_pdisposition",
        "koi_period",
        "koi_depth",
        "koi_comment",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();

    let mut rows = Vec::new();
    for i in 0..per_class * 3 {
        let class = i % 3;
        let disposition = DISPOSITIONS[class];
        let jitter = (i / 3) as f64 * 0.1;
        rows.push(vec![
            RawValue::Number(10_000.0 + i as f64),
            RawValue::Text(disposition.as_str().to_string()),
            RawValue::Text("CANDIDATE".to_string()),
            RawValue::Number(class as f64 * 10.0 + jitter),
            if i % 7 == 0 {
                RawValue::Null
            } else {
                RawValue::Number(((i * 37) % 11) as f64)
            },
            RawValue::Text(format!("note {i}")),
        ]);
    }
    RawTable::new(headers, rows).expect("valid table")
}

fn quick_config() -> TrainingConfig {
    TrainingConfig::new().with_n_estimators(10)
}

#[test]
fn test_default_config_matches_training_recipe() {
    let config = TrainingConfig::default();
    assert_eq!(config.test_size, 0.2);
    assert_eq!(config.random_state, 42);
    assert_eq!(config.cv_folds, 3);
    assert_eq!(config.gbm_exact, BoostingParams::exact());
    assert_eq!(config.gbm_histogram.max_bins, Some(255));
    assert_eq!(config.gbm_histogram.min_samples_leaf, 20);
    assert_eq!(config.forest.n_estimators, 200);
    assert_eq!(config.forest.max_features, MaxFeatures::Sqrt);
    assert_eq!(config.meta.max_iter, 1000);
    assert!(config.drop_columns.contains(&"kepoi_name".to_string()));
}

#[test]
fn test_build_ensemble_names_three_learners() {
    let stack = TrainingConfig::default().build_ensemble().expect("stack");
    let names: Vec<&str> = stack.estimators().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["gbm_exact", "gbm_histogram", "random_forest"]);
    assert_eq!(stack.cv(), 3);
    assert_eq!(stack.n_classes(), 3);
}

#[test]
fn test_train_end_to_end() {
    let table = koi_table(20);
    let outcome = train(&table, &quick_config()).expect("train");

    assert_eq!(
        outcome.bundle.schema().columns(),
        ["koi_period".to_string(), "koi_depth".to_string()]
    );
    assert_eq!(outcome.n_train + outcome.n_test, 60);
    assert_eq!(outcome.n_test, 12);
    assert_eq!(outcome.report.per_class.iter().map(|m| m.support).sum::<usize>(), 12);
    assert!(outcome.report.accuracy > 0.9, "{}", outcome.report);
    assert_eq!(outcome.report.labels[0], "FALSE POSITIVE");
}

#[test]
fn test_train_is_reproducible() {
    let table = koi_table(12);
    let a = train(&table, &quick_config()).expect("train");
    let b = train(&table, &quick_config()).expect("train");
    assert_eq!(a.bundle, b.bundle);
    assert_eq!(a.report, b.report);
}

#[test]
fn test_unknown_label_rejected() {
    let mut table = koi_table(5);
    let headers = table.headers().to_vec();
    let mut rows: Vec<Vec<RawValue>> = table.rows().map(<[RawValue]>::to_vec).collect();
    rows[3][1] = RawValue::Text("NOT DISPOSITIONED".to_string());
    table = RawTable::new(headers, rows).expect("table");

    match train(&table, &quick_config()) {
        Err(KoiError::InvalidLabel(label)) => assert_eq!(label, "NOT DISPOSITIONED"),
        other => panic!("expected InvalidLabel, got {other:?}"),
    }
}

#[test]
fn test_missing_label_column_rejected() {
    let table = koi_table(5);
    let config = TrainingConfig {
        label_column: "disposition".to_string(),
        ..quick_config()
    };
    assert!(matches!(train(&table, &config), Err(KoiError::Data(_))));
}

#[test]
fn test_no_numeric_features_rejected() {
    let table = koi_table(5);
    let config = quick_config().with_drop_columns(vec![
        "kepid".to_string(),
        "koi_period".to_string(),
        "koi_depth".to_string(),
    ]);
    assert!(matches!(train(&table, &config), Err(KoiError::Validation(_))));
}

#[test]
fn test_encode_labels_uses_disposition_table() {
    let table = koi_table(1);
    assert_eq!(encode_labels(&table, "koi_disposition").expect("labels"), vec![0, 1, 2]);
}

#[test]
fn test_config_from_partial_json_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"cv_folds": 5, "forest": {"n_estimators": 50, "max_depth": 8, "min_samples_leaf": 2, "max_features": "log2"}}"#,
    )
    .expect("write");

    let config = TrainingConfig::from_json_file(&path).expect("config");
    assert_eq!(config.cv_folds, 5);
    assert_eq!(config.forest.max_depth, Some(8));
    assert_eq!(config.forest.max_features, MaxFeatures::Log2);
    assert_eq!(config.gbm_exact, BoostingParams::exact());
}

#[test]
fn test_config_rejects_incomplete_learner_section() {
    let parsed: std::result::Result<TrainingConfig, _> =
        serde_json::from_str(r#"{"meta": {"c": 2.0}}"#);
    assert!(parsed.is_err());
}
