use std::fs;

use tabinfer_model::{
    load_predictor, FeatureRow, Model, ModelError, Node, Objective, Predictor, Tree, SCALE,
};
use tempfile::TempDir;

fn diabetes_model() -> Model {
    let glucose = Tree::new(
        vec![
            Node::internal(0, 0, 120 * SCALE, 1, 2),
            Node::leaf(1, -SCALE),
            Node::leaf(2, SCALE),
        ],
        SCALE,
    );
    let pressure = Tree::new(
        vec![
            Node::internal(0, 1, 80 * SCALE, 1, 2).missing_right(),
            Node::leaf(1, -SCALE / 2),
            Node::leaf(2, SCALE / 2),
        ],
        SCALE,
    );

    Model::new(vec![glucose, pressure], 0)
        .with_feature_names(["Glucose", "BloodPressure"])
        .with_objective(Objective::BinaryLogistic)
}

#[test]
fn loads_saved_model_and_scores_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.json");
    diabetes_model().save_json(&path).unwrap();

    let model = load_predictor(&path, None).unwrap();
    let rows = vec![
        FeatureRow::new().with("Glucose", 110i64).with("BloodPressure", 70i64),
        FeatureRow::new().with("Glucose", 150i64).with("BloodPressure", 90i64),
    ];
    let scores = model.predict(&rows).unwrap();

    assert_eq!(scores.len(), 2);
    assert!(scores[0] < 0.5);
    assert!(scores[1] > 0.5);
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
}

#[test]
fn missing_model_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = load_predictor(dir.path().join("absent.json"), None).unwrap_err();
    assert!(matches!(err, ModelError::IoError(_)));
}

#[test]
fn corrupt_model_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.json");
    fs::write(&path, b"{ not json").unwrap();

    let err = load_predictor(&path, None).unwrap_err();
    assert!(matches!(err, ModelError::JsonError(_)));
}

#[test]
fn structurally_invalid_model_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.json");
    let mut model = diabetes_model();
    model.trees[0].nodes[0].left = 9;
    fs::write(&path, serde_json::to_string(&model).unwrap()).unwrap();

    let err = load_predictor(&path, None).unwrap_err();
    assert!(matches!(err, ModelError::ValidationFailed(_)));
}

#[test]
fn expected_hash_is_enforced() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.json");
    let model = diabetes_model();
    // Pretty-printed on disk; the hash is over canonical JSON.
    fs::write(&path, serde_json::to_string_pretty(&model).unwrap()).unwrap();
    let hash = model.hash_hex().unwrap();

    assert!(load_predictor(&path, Some(&hash.to_uppercase())).is_ok());

    let err = load_predictor(&path, Some(&"0".repeat(64))).unwrap_err();
    match err {
        ModelError::HashMismatch { actual, .. } => assert_eq!(actual, hash),
        other => panic!("expected hash mismatch, got {other:?}"),
    }
}
