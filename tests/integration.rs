//! End-to-end tests: train on a KOI-style table, persist, reload, classify.

use koi_classifier::artifacts::ArtifactBundle;
use koi_classifier::data::{RawRecord, RawTable, RawValue};
use koi_classifier::disposition::{Disposition, DISPOSITIONS};
use koi_classifier::inference::{InferenceService, RowStatus};
use koi_classifier::preprocessing::Preprocessor;
use koi_classifier::prelude::*;
use serde_json::json;
use std::sync::{Arc, OnceLock};

const FEATURES: [&str; 4] = ["koi_period", "koi_depth", "koi_prad", "koi_teq"];

/// Labelled table: 30 rows per class. `koi_period` and `koi_prad` separate
/// the classes, `koi_depth` has gaps, `koi_teq` is constant.
fn koi_table() -> RawTable {
    let mut csv = String::from(
        "kepid,kepoi_name,koi_disposition,koi_pdisposition,koi_period,koi_depth,koi_prad,koi_teq\n",
    );
    for i in 0..90 {
        let class = i % 3;
        let step = (i / 3) as f64;
        let depth = if i % 8 == 0 {
            String::new()
        } else {
            format!("{}", 100.0 + ((i * 31) % 17) as f64)
        };
        csv.push_str(&format!(
            "{},K{:05}.01,{},CANDIDATE,{},{},{},800\n",
            10_000 + i,
            i,
            DISPOSITIONS[class],
            class as f64 * 15.0 + step * 0.2,
            depth,
            1.0 + class as f64 * 3.0 + step * 0.05,
        ));
    }
    RawTable::from_csv_reader(csv.as_bytes()).expect("valid csv")
}

fn trained_bundle() -> &'static ArtifactBundle {
    static BUNDLE: OnceLock<ArtifactBundle> = OnceLock::new();
    BUNDLE.get_or_init(|| {
        let config = TrainingConfig::new().with_n_estimators(15);
        train(&koi_table(), &config).expect("training").bundle
    })
}

fn service() -> InferenceService {
    InferenceService::new(Arc::new(trained_bundle().clone()))
}

fn record(value: serde_json::Value) -> RawRecord {
    serde_json::from_value(value).expect("record")
}

fn is_two_decimal_percent(s: &str) -> bool {
    let Some(number) = s.strip_suffix('%') else {
        return false;
    };
    let mut parts = number.split('.');
    let (Some(int), Some(frac), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !int.is_empty()
        && int.chars().all(|c| c.is_ascii_digit())
        && frac.len() == 2
        && frac.chars().all(|c| c.is_ascii_digit())
}

#[test]
fn test_schema_excludes_identifiers_and_labels() {
    assert_eq!(trained_bundle().schema().columns(), FEATURES);
}

#[test]
fn test_predictions_use_label_set_and_confidence_range() {
    let service = service();
    for period in [0.5, 3.0, 15.5, 18.0, 30.5, 35.0] {
        let p = service
            .predict_one(&record(json!({
                "koi_period": period, "koi_depth": 105.0, "koi_prad": 1.0 + period / 5.0, "koi_teq": 800
            })))
            .expect("prediction");
        assert!(DISPOSITIONS.contains(&p.disposition));
        let c = p.confidence.percent();
        assert!((33.33..=100.0).contains(&c), "confidence {c}");
        assert!(is_two_decimal_percent(&p.confidence.to_string()));
    }
}

#[test]
fn test_separable_records_get_their_class() {
    let service = service();
    let low = record(json!({"koi_period": 1.0, "koi_depth": 110.0, "koi_prad": 1.2, "koi_teq": 800}));
    let high = record(json!({"koi_period": 33.0, "koi_depth": 110.0, "koi_prad": 7.5, "koi_teq": 800}));
    assert_eq!(
        service.predict_one(&low).expect("low").disposition,
        Disposition::FalsePositive
    );
    assert_eq!(
        service.predict_one(&high).expect("high").disposition,
        Disposition::Candidate
    );
}

#[test]
fn test_missing_columns_are_listed_exactly() {
    let err = service()
        .predict_one(&record(json!({"koi_depth": 1.0, "koi_teq": 800, "koi_score": 0.4})))
        .unwrap_err();
    assert_eq!(
        err.missing_columns(),
        Some(&["koi_period".to_string(), "koi_prad".to_string()][..])
    );
}

#[test]
fn test_prediction_is_idempotent() {
    let service = service();
    let r = record(json!({"koi_period": 14.0, "koi_depth": null, "koi_prad": 4.0, "koi_teq": 800}));
    let first = service.predict_one(&r).expect("first");
    for _ in 0..3 {
        assert_eq!(service.predict_one(&r).expect("again"), first);
    }
}

#[test]
fn test_all_null_record_equals_record_at_medians() {
    let service = service();
    let medians = trained_bundle()
        .preprocessor()
        .imputer()
        .statistics()
        .expect("fitted");
    let mut at_medians = RawRecord::new();
    let mut all_null = RawRecord::new();
    for (name, &m) in FEATURES.iter().zip(medians) {
        at_medians.insert(name.to_string(), RawValue::Number(f64::from(m)));
        all_null.insert(name.to_string(), RawValue::Null);
    }
    assert_eq!(
        service.predict_one(&all_null).expect("nulls"),
        service.predict_one(&at_medians).expect("medians")
    );
}

#[test]
fn test_constant_feature_scales_to_zero() {
    let teq = FEATURES.iter().position(|&f| f == "koi_teq").expect("koi_teq");
    let pre = trained_bundle().preprocessor();
    for value in [800.0, 0.0, 5_000.0] {
        let mut row = vec![Some(1.0); FEATURES.len()];
        row[teq] = Some(value);
        assert_eq!(pre.transform_row(&row).expect("transform")[teq], 0.0);
    }
}

#[test]
fn test_zero_variance_on_fresh_preprocessor() {
    let x = Matrix::from_vec(3, 2, vec![1.0, 7.0, 2.0, 7.0, f32::NAN, 7.0]).expect("matrix");
    let mut pre = Preprocessor::new();
    let out = pre.fit_transform(&x).expect("fit");
    for i in 0..3 {
        assert_eq!(out.get(i, 1), 0.0);
    }
    assert_eq!(pre.imputer().statistics(), Some(&[1.5, 7.0][..]));
}

#[test]
fn test_batch_isolates_one_malformed_row() {
    let csv = "kepoi_name,koi_period,koi_depth,koi_prad,koi_teq\n\
               K1,1.0,101,1.1,800\n\
               K2,16.0,,4.1,800\n\
               K3,x1,101,1.1,800\n\
               K4,31.0,120,7.2,800\n\
               K5,2.0,99,1.3,\n";
    let table = RawTable::from_csv_reader(csv.as_bytes()).expect("csv");
    let service = service();
    let report = service.predict_batch(&table).expect("batch");

    assert_eq!(report.total_processed, 5);
    assert_eq!(report.successful, 4);
    let statuses: Vec<RowStatus> = report.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [
            RowStatus::Success,
            RowStatus::Success,
            RowStatus::Error,
            RowStatus::Success,
            RowStatus::Success
        ]
    );
    let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["0", "1", "2", "3", "4"]);
    assert_eq!(report.results[2].prediction, "ERROR");
    assert_eq!(report.results[2].confidence, "0.00%");
    assert!(report.results[2]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("x1")));
    for row in report.results.iter().filter(|r| r.status == RowStatus::Success) {
        assert!(is_two_decimal_percent(&row.confidence));
    }
}

#[test]
fn test_batch_without_schema_column_scores_nothing() {
    let csv = "id,koi_period,koi_depth\n1,1.0,100\n";
    let table = RawTable::from_csv_reader(csv.as_bytes()).expect("csv");
    let err = service().predict_batch(&table).unwrap_err();
    assert_eq!(
        err.missing_columns(),
        Some(&["koi_prad".to_string(), "koi_teq".to_string()][..])
    );
}

#[test]
fn test_artifacts_round_trip_through_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    trained_bundle().save(dir.path()).expect("save");
    let reloaded = InferenceService::from_dir(dir.path()).expect("load");
    assert_eq!(reloaded.bundle(), trained_bundle());

    let r = record(json!({"koi_period": 16.0, "koi_depth": 112.0, "koi_prad": 4.2, "koi_teq": 800}));
    assert_eq!(
        reloaded.predict_one(&r).expect("reloaded"),
        service().predict_one(&r).expect("in memory")
    );
}

#[test]
fn test_training_report_covers_held_out_rows() {
    let outcome = train(&koi_table(), &TrainingConfig::new().with_n_estimators(15)).expect("train");
    assert_eq!(outcome.n_test, 18);
    assert_eq!(outcome.n_train, 72);
    assert!(outcome.report.accuracy > 0.8, "{}", outcome.report);
    assert!(outcome.report.to_string().contains("macro avg"));
}
