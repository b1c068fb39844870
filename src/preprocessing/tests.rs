//! Tests for preprocessing module.

use super::*;

#[test]
fn test_new() {
    let scaler = StandardScaler::new();
    assert!(!scaler.is_fitted());
    assert!(!SimpleImputer::default().is_fitted());
    assert!(!Preprocessor::new().is_fitted());
}

#[test]
fn test_fit_basic() {
    let data = Matrix::from_vec(3, 2, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0])
        .expect("valid matrix dimensions");

    let mut scaler = StandardScaler::new();
    scaler
        .fit(&data)
        .expect("fit should succeed with valid data");

    assert!(scaler.is_fitted());

    // Mean should be [2.0, 20.0]
    let mean = scaler.mean().expect("fitted");
    assert!((mean[0] - 2.0).abs() < 1e-6);
    assert!((mean[1] - 20.0).abs() < 1e-6);

    // Population std: sqrt(2/3)
    let std = scaler.std().expect("fitted");
    let expected_std = (2.0_f32 / 3.0).sqrt();
    assert!((std[0] - expected_std).abs() < 1e-4);
    assert!((std[1] - expected_std * 10.0).abs() < 1e-3);
}

#[test]
fn test_transform_basic() {
    let data = Matrix::from_vec(3, 1, vec![1.0, 2.0, 3.0]).expect("valid matrix dimensions");

    let mut scaler = StandardScaler::new();
    let transformed = scaler.fit_transform(&data).expect("fit_transform");

    let expected = 1.0 / (2.0_f32 / 3.0).sqrt();
    assert!((transformed.get(0, 0) + expected).abs() < 1e-5);
    assert!(transformed.get(1, 0).abs() < 1e-6);
    assert!((transformed.get(2, 0) - expected).abs() < 1e-5);
}

#[test]
fn test_constant_feature_maps_every_input_to_zero() {
    let data = Matrix::from_vec(3, 2, vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0])
        .expect("valid matrix dimensions");

    let mut scaler = StandardScaler::new();
    scaler.fit(&data).expect("fit");

    for value in [5.0, -100.0, 1e6] {
        let row = scaler.transform_row(&[2.0, value]).expect("row");
        assert_eq!(row[1], 0.0);
    }
}

#[test]
fn test_empty_data_error() {
    let data = Matrix::from_vec(0, 2, vec![]).expect("empty matrix should be valid");
    assert!(StandardScaler::new().fit(&data).is_err());
    assert!(SimpleImputer::new().fit(&data).is_err());
}

#[test]
fn test_transform_not_fitted_error() {
    let data = Matrix::from_vec(3, 1, vec![1.0, 2.0, 3.0]).expect("valid matrix dimensions");
    assert!(matches!(
        StandardScaler::new().transform(&data),
        Err(KoiError::NotFitted("StandardScaler"))
    ));
    assert!(matches!(
        SimpleImputer::new().transform(&data),
        Err(KoiError::NotFitted("SimpleImputer"))
    ));
}

#[test]
fn test_dimension_mismatch_error() {
    let train = Matrix::from_vec(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        .expect("valid matrix dimensions");
    let test = Matrix::from_vec(3, 3, vec![1.0; 9]).expect("valid matrix dimensions");

    let mut pre = Preprocessor::new();
    pre.fit(&train).expect("fit should succeed");

    assert!(matches!(
        pre.transform(&test),
        Err(KoiError::Transform {
            expected: 2,
            actual: 3
        })
    ));
    assert!(matches!(
        pre.transform_row(&[Some(1.0)]),
        Err(KoiError::Transform {
            expected: 2,
            actual: 1
        })
    ));
}

#[test]
fn test_imputer_medians_ignore_nan() {
    let data = Matrix::from_vec(
        4,
        2,
        vec![1.0, f32::NAN, f32::NAN, f32::NAN, 3.0, f32::NAN, 10.0, f32::NAN],
    )
    .expect("valid matrix");

    let mut imputer = SimpleImputer::new();
    imputer.fit(&data).expect("fit");
    // Column 0 median of {1, 3, 10} is 3; column 1 is entirely missing.
    assert_eq!(imputer.statistics(), Some(&[3.0, 0.0][..]));

    let filled = imputer.transform(&data).expect("transform");
    assert_eq!(filled.count_missing(), 0);
    assert_eq!(filled.get(1, 0), 3.0);
}

#[test]
fn test_scaler_sees_imputed_values() {
    let data = Matrix::from_vec(3, 1, vec![0.0, f32::NAN, 4.0]).expect("valid matrix");
    let mut pre = Preprocessor::new();
    pre.fit(&data).expect("fit");

    // Imputed column is [0, 2, 4]: mean 2.
    let mean = pre.scaler().mean().expect("fitted");
    assert!((mean[0] - 2.0).abs() < 1e-6);
    assert_eq!(pre.n_features(), Some(1));
}

#[test]
fn test_missing_input_equals_median_input() {
    let data = Matrix::from_vec(3, 2, vec![1.0, 10.0, 2.0, 40.0, 6.0, f32::NAN])
        .expect("valid matrix");
    let mut pre = Preprocessor::new();
    pre.fit(&data).expect("fit");

    let medians = pre.imputer().statistics().expect("fitted").to_vec();
    let imputed = pre.transform_row(&[None, None]).expect("row");
    let explicit = pre
        .transform_row(&[Some(medians[0]), Some(medians[1])])
        .expect("row");
    assert_eq!(imputed, explicit);
}

#[test]
fn test_row_and_matrix_paths_agree() {
    let data = Matrix::from_vec(4, 2, vec![1.0, 7.0, f32::NAN, 3.0, 5.0, f32::NAN, 2.0, 8.0])
        .expect("valid matrix");
    let mut pre = Preprocessor::new();
    let whole = pre.fit_transform(&data).expect("fit_transform");

    let row = pre.transform_row(&[None, Some(3.0)]).expect("row");
    assert_eq!(row.as_slice(), whole.row(1));
}

#[test]
fn test_from_parts_rejects_width_mismatch() {
    let imputer = SimpleImputer::from_statistics(vec![0.0, 1.0]);
    let scaler = StandardScaler::from_statistics(vec![0.0], vec![1.0]).expect("scaler");
    assert!(Preprocessor::from_parts(imputer, scaler).is_err());
    assert!(Preprocessor::from_parts(SimpleImputer::new(), StandardScaler::new()).is_err());
}

#[test]
fn test_safetensors_round_trip() {
    let data = Matrix::from_vec(3, 2, vec![1.0, f32::NAN, 2.0, 20.0, 9.0, 30.0])
        .expect("valid matrix");
    let mut pre = Preprocessor::new();
    pre.fit(&data).expect("fit");

    let dir = tempfile::tempdir().expect("tempdir");
    let imputer_path = dir.path().join("imputer.safetensors");
    let scaler_path = dir.path().join("scaler.safetensors");
    pre.imputer().save_safetensors(&imputer_path).expect("save imputer");
    pre.scaler().save_safetensors(&scaler_path).expect("save scaler");

    let imputer = SimpleImputer::load_safetensors(&imputer_path).expect("load imputer");
    let scaler = StandardScaler::load_safetensors(&scaler_path).expect("load scaler");
    let loaded = Preprocessor::from_parts(imputer, scaler).expect("parts");
    assert_eq!(loaded, pre);
}

#[test]
fn test_save_unfitted_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(StandardScaler::new()
        .save_safetensors(dir.path().join("s"))
        .is_err());
    assert!(SimpleImputer::new()
        .save_safetensors(dir.path().join("i"))
        .is_err());
}

#[test]
fn test_load_scaler_rejects_length_mismatch() {
    use crate::serialization::safetensors::save_safetensors;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scaler.safetensors");
    let mut tensors = BTreeMap::new();
    tensors.insert("mean".to_string(), (vec![0.0, 1.0], vec![2]));
    tensors.insert("std".to_string(), (vec![1.0], vec![1]));
    save_safetensors(&path, &tensors, &UserMetadata::new()).expect("save");

    let err = StandardScaler::load_safetensors(&path).unwrap_err();
    assert!(err.contains("different lengths"));
}
