use super::*;
use crate::classification::LogisticRegression;
use crate::error::KoiError;
use crate::primitives::Matrix;
use crate::traits::ProbabilisticClassifier;
use crate::tree::{GradientBoostingClassifier, RandomForestClassifier};

/// Three well separated clusters in two features, 8 samples per class.
fn clusters() -> (Matrix<f32>, Vec<usize>) {
    let centers = [(0.0, 0.0), (4.0, 4.0), (8.0, 0.0)];
    let offsets = [
        (0.1, 0.2),
        (-0.2, 0.1),
        (0.3, -0.1),
        (-0.1, -0.3),
        (0.2, 0.3),
        (-0.3, 0.2),
        (0.0, -0.2),
        (0.1, 0.0),
    ];
    let mut data = Vec::new();
    let mut y = Vec::new();
    for (class, &(cx, cy)) in centers.iter().enumerate() {
        for &(dx, dy) in &offsets {
            data.push(cx + dx);
            data.push(cy + dy);
            y.push(class);
        }
    }
    (Matrix::from_vec(24, 2, data).expect("24x2 matrix"), y)
}

fn small_stack() -> StackingClassifier {
    StackingClassifier::builder()
        .estimator(
            "gbm",
            GradientBoostingClassifier::new()
                .with_n_estimators(20)
                .with_max_depth(2),
        )
        .estimator(
            "gbm_hist",
            GradientBoostingClassifier::new()
                .with_n_estimators(20)
                .with_max_depth(2)
                .with_max_bins(16)
                .with_subsample(0.8)
                .with_random_state(42),
        )
        .estimator("rf", RandomForestClassifier::new(15).with_random_state(42))
        .build()
        .expect("valid stack")
}

#[test]
fn test_fit_predict_clusters() {
    let (x, y) = clusters();
    let mut stack = small_stack();
    stack.fit(&x, &y).expect("fit");

    assert!(stack.is_fitted());
    assert_eq!(stack.n_features(), Some(2));
    assert_eq!(stack.predict(&x).expect("predict"), y);

    let (label, proba) = stack.predict_row(&[7.9, 0.1]).expect("row");
    assert_eq!(label, 2);
    assert_eq!(proba.len(), 3);
    assert!((proba.iter().sum::<f32>() - 1.0).abs() < 1e-5);
}

#[test]
fn test_meta_features_have_one_block_per_learner() {
    let (x, y) = clusters();
    let mut stack = small_stack();
    stack.fit(&x, &y).expect("fit");

    let meta = stack.meta_features(&x).expect("meta");
    assert_eq!(meta.shape(), (24, 9));
    for i in 0..meta.n_rows() {
        for block in meta.row(i).chunks(3) {
            assert!((block.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
    }
    assert_eq!(stack.final_estimator().n_classes(), 3);
}

#[test]
fn test_missing_class_in_training_still_emits_all_columns() {
    let (x, y) = clusters();
    let keep: Vec<usize> = (0..16).collect();
    let x = x.select_rows(&keep);
    let y = &y[..16];

    let mut stack = small_stack();
    stack.fit(&x, y).expect("fit");
    let proba = stack.predict_proba(&x).expect("proba");
    assert_eq!(proba.n_cols(), 3);
    assert!((0..proba.n_rows()).all(|i| proba.get(i, 2) < 0.5));
}

#[test]
fn test_seeded_fit_is_reproducible() {
    let (x, y) = clusters();
    let mut a = small_stack();
    let mut b = small_stack();
    a.fit(&x, &y).expect("fit");
    b.fit(&x, &y).expect("fit");
    assert_eq!(
        a.predict_proba(&x).expect("proba"),
        b.predict_proba(&x).expect("proba")
    );
}

#[test]
fn test_bytes_round_trip() {
    let (x, y) = clusters();
    let mut stack = small_stack();
    stack.fit(&x, &y).expect("fit");

    let restored = StackingClassifier::from_bytes(&stack.to_bytes().expect("encode")).expect("decode");
    assert_eq!(restored, stack);
    assert!(matches!(
        StackingClassifier::from_bytes(&[1, 2, 3]),
        Err(KoiError::Serialization(_))
    ));
}

#[test]
fn test_not_fitted_and_width_errors() {
    let stack = small_stack();
    assert!(matches!(
        stack.predict_row(&[0.0, 0.0]),
        Err(KoiError::NotFitted("StackingClassifier"))
    ));

    let (x, y) = clusters();
    let mut stack = small_stack();
    stack.fit(&x, &y).expect("fit");
    assert!(stack.predict_row(&[0.0]).is_err());
}

#[test]
fn test_label_outside_class_count_rejected() {
    let (x, mut y) = clusters();
    y[0] = 3;
    assert!(small_stack().fit(&x, &y).is_err());
}

#[test]
fn test_builder_validation() {
    assert!(matches!(
        StackingClassifier::builder().build(),
        Err(KoiError::InvalidHyperparameter { .. })
    ));
    assert!(StackingClassifier::builder()
        .estimator("rf", RandomForestClassifier::new(2))
        .cv(1)
        .build()
        .is_err());
    assert!(StackingClassifier::builder()
        .estimator("rf", RandomForestClassifier::new(2))
        .estimator("rf", RandomForestClassifier::new(3))
        .build()
        .is_err());

    let stack = StackingClassifier::builder()
        .estimator("rf", RandomForestClassifier::new(2))
        .final_estimator(LogisticRegression::new().with_c(0.5))
        .cv(5)
        .build()
        .expect("valid");
    assert_eq!(stack.cv(), 5);
    assert_eq!(stack.estimators()[0].name, "rf");
    assert_eq!(stack.n_classes(), 3);
}

#[test]
fn test_check_fitted_detects_width_disagreement() {
    let (x, y) = clusters();
    let mut stack = small_stack();
    assert!(matches!(
        stack.check_fitted(),
        Err(KoiError::NotFitted("StackingClassifier"))
    ));
    stack.fit(&x, &y).expect("fit");
    assert!(stack.check_fitted().is_ok());

    let mut value = serde_json::to_value(&stack).expect("to json");
    value["n_features"] = serde_json::json!(3);
    let widened: StackingClassifier = serde_json::from_value(value).expect("from json");
    let err = widened.check_fitted().unwrap_err();
    assert!(err.to_string().contains("estimator 'gbm'"), "{err}");
}
