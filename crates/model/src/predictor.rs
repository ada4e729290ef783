//! Predictor seam between the model artifact and the request handlers

use crate::features::FeatureRow;
use crate::gbdt::{Model, ModelError};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Errors raised while scoring rows
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictError {
    #[error("feature_names mismatch: missing from input {missing:?}, unexpected in input {unexpected:?}")]
    FeatureMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("expected at least {expected} feature values, got {actual}")]
    TooFewFeatures { expected: usize, actual: usize },

    #[error("feature '{feature}' must be numeric, got {kind}")]
    NonNumeric { feature: String, kind: &'static str },

    #[error("value for feature '{0}' exceeds the model's fixed-point range")]
    ValueOutOfRange(String),
}

/// Anything that turns feature rows into scores
///
/// Implementations are immutable after construction and shared across
/// concurrent requests.
pub trait Predictor: Send + Sync {
    /// One score per input row, in input order
    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<f64>, PredictError>;
}

impl Predictor for Model {
    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<f64>, PredictError> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}

/// Load the model artifact served by the process
///
/// With `expected_hash` set, the canonical blake3 hash of the loaded model
/// must match it (hex, case-insensitive).
pub fn load_predictor<P: AsRef<Path>>(
    path: P,
    expected_hash: Option<&str>,
) -> Result<Model, ModelError> {
    let path = path.as_ref();
    let model = Model::load_json(path)?;
    let actual = model.hash_hex()?;

    if let Some(expected) = expected_hash {
        let expected = expected.trim();
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(ModelError::HashMismatch {
                expected: expected.to_lowercase(),
                actual,
            });
        }
    }

    info!(
        path = %path.display(),
        trees = model.num_trees(),
        features = model.num_features(),
        hash = %actual,
        "loaded model"
    );
    Ok(model)
}
