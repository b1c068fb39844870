use super::*;
use crate::artifacts::tests::tiny_bundle;
use crate::data::RawValue;
use serde_json::json;

fn service() -> InferenceService {
    InferenceService::new(Arc::new(tiny_bundle()))
}

fn record(value: serde_json::Value) -> RawRecord {
    serde_json::from_value(value).expect("record")
}

#[test]
fn test_confidence_formats_two_decimals() {
    let c = Confidence::from_probabilities(&[0.1, 0.874_21, 0.025_79]);
    assert_eq!(c.to_string(), "87.42%");
    assert_eq!(Confidence::ZERO.to_string(), "0.00%");
    assert_eq!(serde_json::to_value(c).expect("json"), json!("87.42%"));
}

#[test]
fn test_prediction_from_model_output() {
    let p = Prediction::from_model_output(1, vec![0.2, 0.5, 0.3]).expect("prediction");
    assert_eq!(p.disposition, Disposition::Confirmed);
    assert_eq!(p.confidence.to_string(), "50.00%");
    assert_eq!(
        serde_json::to_value(&p).expect("json"),
        json!({"prediction": "CONFIRMED", "confidence": "50.00%"})
    );

    assert!(Prediction::from_model_output(3, vec![0.2, 0.5, 0.3]).is_err());
    assert!(Prediction::from_model_output(0, vec![1.0, 0.0]).is_err());
}

#[test]
fn test_predict_one_separates_classes() {
    let service = service();
    let low = service
        .predict_one(&record(json!({"koi_period": 1.0, "koi_depth": 100.0})))
        .expect("low");
    let high = service
        .predict_one(&record(json!({"koi_period": 21.0, "koi_depth": 100.0})))
        .expect("high");

    assert_eq!(low.disposition, Disposition::FalsePositive);
    assert_eq!(high.disposition, Disposition::Candidate);
    for p in [&low, &high] {
        let sum: f32 = p.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(p.confidence.percent() >= 100.0 / 3.0 && p.confidence.percent() <= 100.0);
    }
}

#[test]
fn test_predict_one_ignores_extras_and_imputes_nulls() {
    let service = service();
    let base = service
        .predict_one(&record(json!({"koi_period": 11.0, "koi_depth": null})))
        .expect("null depth");
    let extra = service
        .predict_one(&record(
            json!({"koi_depth": null, "kepoi_name": "K00752.01", "koi_period": 11.0}),
        ))
        .expect("extra fields");
    assert_eq!(base, extra);
}

#[test]
fn test_predict_one_lists_every_missing_column() {
    let err = service().predict_one(&record(json!({"koi_prad": 2.0}))).unwrap_err();
    assert_eq!(
        err.missing_columns(),
        Some(&["koi_period".to_string(), "koi_depth".to_string()][..])
    );
}

#[test]
fn test_predict_one_rejects_text_value() {
    let err = service()
        .predict_one(&record(json!({"koi_period": "abc", "koi_depth": 1.0})))
        .unwrap_err();
    assert!(matches!(
        err,
        KoiError::RowProcessing(RowFailure::ValueParse { ref column, .. }) if column == "koi_period"
    ));
}

#[test]
fn test_predict_one_is_idempotent() {
    let service = service();
    let r = record(json!({"koi_period": 10.5, "koi_depth": 200.0}));
    assert_eq!(
        service.predict_one(&r).expect("first"),
        service.predict_one(&r).expect("second")
    );
}

#[test]
fn test_batch_isolates_bad_rows() {
    let csv = "id,koi_period,koi_depth\n\
               a,1.0,100\n\
               b,abc,100\n\
               c,21.0,\n";
    let table = RawTable::from_csv_reader(csv.as_bytes()).expect("csv");
    let report = service().predict_batch(&table).expect("batch");

    assert_eq!(report.total_processed, 3);
    assert_eq!(report.successful, 2);
    assert_eq!(report.failed(), 1);

    let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);

    let bad = &report.results[1];
    assert_eq!(bad.status, RowStatus::Error);
    assert_eq!(bad.prediction, ERROR_MARKER);
    assert_eq!(bad.confidence, "0.00%");
    assert!(bad.error.as_deref().is_some_and(|e| e.contains("koi_period")));

    assert_eq!(report.results[0].prediction, "FALSE POSITIVE");
    assert_eq!(report.results[2].prediction, "CANDIDATE");
}

#[test]
fn test_batch_rows_match_single_predictions() {
    let service = service();
    let records = vec![
        record(json!({"koi_period": 1.0, "koi_depth": 0.0})),
        record(json!({"koi_period": 11.0, "koi_depth": 300.0})),
    ];
    let report = service.predict_records(records.clone()).expect("batch");
    for (row, r) in report.results.iter().zip(&records) {
        let single = service.predict_one(r).expect("single");
        assert_eq!(row.prediction, single.disposition.as_str());
        assert_eq!(row.confidence, single.confidence.to_string());
    }
    let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["0", "1"]);
}

#[test]
fn test_batch_missing_column_scores_nothing() {
    let table = RawTable::from_csv_reader("id,koi_period\n1,2.0\n".as_bytes()).expect("csv");
    let err = service().predict_batch(&table).unwrap_err();
    assert_eq!(err.missing_columns(), Some(&["koi_depth".to_string()][..]));
}

#[test]
fn test_empty_record_list_rejected() {
    assert!(matches!(
        service().predict_records(Vec::new()),
        Err(KoiError::Validation(_))
    ));
}

#[test]
fn test_batch_report_serialization() {
    let outcomes = vec![
        (
            "7".to_string(),
            RowOutcome::Success(
                Prediction::from_model_output(2, vec![0.1, 0.2, 0.7]).expect("prediction"),
            ),
        ),
        (
            "8".to_string(),
            RowOutcome::Failure(RowFailure::TypeMismatch {
                column: "koi_depth".to_string(),
                found: "boolean".to_string(),
            }),
        ),
    ];
    let value = serde_json::to_value(BatchReport::from_outcomes(&outcomes)).expect("json");
    assert_eq!(value["total_processed"], 2);
    assert_eq!(value["successful"], 1);
    assert_eq!(
        value["results"][0],
        json!({"id": "7", "prediction": "CANDIDATE", "confidence": "70.00%", "status": "success"})
    );
    assert_eq!(value["results"][1]["status"], "error");
    assert!(value["results"][1]["error"].is_string());
}

#[test]
fn test_explanation_prompt_embeds_context() {
    let service = service();
    let r = record(json!({"koi_period": 1.0, "koi_depth": 100.0}));
    let prediction = service.predict_one(&r).expect("prediction");
    let context = ExplanationContext::new(&r, &prediction);

    let prompt = context.render_prompt("  What does koi_period mean? ").expect("prompt");
    assert!(prompt.starts_with("You are Exo-Chat"));
    assert!(prompt.contains(r#""koi_period":1.0"#));
    assert!(prompt.contains(&format!(
        "classified as a \"{}\" with {} confidence",
        prediction.disposition, prediction.confidence
    )));
    assert!(prompt.ends_with("USER'S QUESTION: \"What does koi_period mean?\""));
}

#[test]
fn test_explanation_requires_question_and_context() {
    let mut input = RawRecord::new();
    input.insert("koi_period".to_string(), RawValue::Number(3.0));
    let context = ExplanationContext {
        input_data: input,
        prediction: "CONFIRMED".to_string(),
        confidence: "91.00%".to_string(),
    };
    assert!(matches!(context.render_prompt("   "), Err(KoiError::Validation(_))));

    let empty = ExplanationContext {
        input_data: RawRecord::new(),
        ..context
    };
    assert!(matches!(empty.render_prompt("why?"), Err(KoiError::Validation(_))));
}

#[test]
fn test_service_is_shareable_across_threads() {
    fn assert_shareable<T: Send + Sync + Clone>() {}
    assert_shareable::<InferenceService>();

    let service = service();
    let r = record(json!({"koi_period": 11.0, "koi_depth": 100.0}));
    let expected = service.predict_one(&r).expect("main thread");
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let r = r.clone();
            std::thread::spawn(move || service.predict_one(&r).expect("worker"))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("join"), expected);
    }
}

#[test]
fn test_batch_isolates_non_utf8_row() {
    let csv: &[u8] = b"id,koi_period,koi_depth\n\
                       a,1.0,100\n\
                       b,11.0,\xff\xfe\n\
                       c,21.0,100\n\
                       d,1.5,1e39\n";
    let table = RawTable::from_csv_reader(csv).expect("csv");
    let report = service().predict_batch(&table).expect("batch");

    assert_eq!(report.total_processed, 4);
    assert_eq!(report.successful, 2);
    let statuses: Vec<RowStatus> = report.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [RowStatus::Success, RowStatus::Error, RowStatus::Success, RowStatus::Error]
    );
    assert!(report.results[1]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("koi_depth")));
}
