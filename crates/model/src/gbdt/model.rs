//! GBDT Model with deterministic inference
//!
//! Implements a fixed-point GBDT model with:
//! - Canonical JSON serialization
//! - Blake3 model hashing
//! - Integer-only tree traversal and accumulation
//! - Name-aware encoding of feature rows

use super::tree::Tree;
use crate::features::{FeatureRow, FeatureValue};
use crate::predictor::PredictError;
use crate::serde_canon::{hash_canonical_hex, to_canonical_json, CanonicalError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// GBDT Model errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Canonical serialization error: {0}")]
    CanonicalError(#[from] CanonicalError),

    #[error("Model hash mismatch: expected {expected}, found {actual}")]
    HashMismatch { expected: String, actual: String },
}

/// Default scale factor for fixed-point arithmetic (1e6)
pub const SCALE: i64 = 1_000_000;

/// Transformation applied to the raw ensemble margin
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Objective {
    /// Margin returned as-is
    #[default]
    #[serde(rename = "raw")]
    Raw,
    /// Margin passed through the logistic function
    #[serde(rename = "binary:logistic")]
    BinaryLogistic,
}

impl Objective {
    fn apply(self, margin: f64) -> f64 {
        match self {
            Objective::Raw => margin,
            Objective::BinaryLogistic => 1.0 / (1.0 + (-margin).exp()),
        }
    }
}

/// GBDT Model with integer-only representation
///
/// Thresholds, leaves and bias are fixed-point integers scaled by `scale`.
/// When `feature_names` is present, rows are matched to model inputs by
/// name; otherwise values are consumed positionally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    /// Model format version (always 1 for now)
    pub version: i32,

    /// Fixed-point scale factor (typically 1_000_000 for micro precision)
    pub scale: i64,

    /// Decision trees in the ensemble
    pub trees: Vec<Tree>,

    /// Bias term (fixed-point integer)
    pub bias: i64,

    /// Divisor turning the accumulated margin back into a real number
    pub post_scale: i64,

    /// Input names in model order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,

    #[serde(default)]
    pub objective: Objective,
}

impl Model {
    pub fn new(trees: Vec<Tree>, bias: i64) -> Self {
        Self {
            version: 1,
            scale: SCALE,
            trees,
            bias,
            post_scale: SCALE,
            feature_names: None,
            objective: Objective::Raw,
        }
    }

    pub fn with_feature_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    /// Validate model structure
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.version != 1 {
            return Err(ModelError::ValidationFailed(format!(
                "Unsupported model version: {}",
                self.version
            )));
        }

        if self.scale <= 0 {
            return Err(ModelError::ValidationFailed(format!(
                "Invalid scale: {}",
                self.scale
            )));
        }

        if self.post_scale <= 0 {
            return Err(ModelError::ValidationFailed(format!(
                "Invalid post_scale: {}",
                self.post_scale
            )));
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|e| {
                ModelError::ValidationFailed(format!("Tree {} validation failed: {}", i, e))
            })?;
        }

        if let Some(names) = &self.feature_names {
            let mut seen = HashSet::new();
            for name in names {
                if !seen.insert(name.as_str()) {
                    return Err(ModelError::ValidationFailed(format!(
                        "Duplicate feature name: {name}"
                    )));
                }
            }

            if let Some(max_idx) = self.max_feature_idx() {
                if max_idx >= names.len() {
                    return Err(ModelError::ValidationFailed(format!(
                        "Trees reference feature {} but only {} feature names are declared",
                        max_idx,
                        names.len()
                    )));
                }
            }
        }

        Ok(())
    }

    fn max_feature_idx(&self) -> Option<usize> {
        self.trees.iter().filter_map(Tree::max_feature_idx).max()
    }

    /// Number of input values a row must supply
    pub fn num_features(&self) -> usize {
        match &self.feature_names {
            Some(names) => names.len(),
            None => self.max_feature_idx().map_or(0, |idx| idx + 1),
        }
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Turn a feature row into the fixed-point vector the trees consume
    pub fn encode_row(&self, row: &FeatureRow) -> Result<Vec<Option<i64>>, PredictError> {
        match &self.feature_names {
            Some(names) => {
                let missing: Vec<String> = names
                    .iter()
                    .filter(|name| !row.contains(name))
                    .cloned()
                    .collect();
                let unexpected: Vec<String> = row
                    .names()
                    .filter(|name| !names.iter().any(|n| n == name))
                    .map(str::to_string)
                    .collect();

                if !missing.is_empty() || !unexpected.is_empty() {
                    return Err(PredictError::FeatureMismatch {
                        missing,
                        unexpected,
                    });
                }

                names
                    .iter()
                    .map(|name| match row.get(name) {
                        Some(value) => self.encode_value(name, value),
                        None => Ok(None),
                    })
                    .collect()
            }
            None => {
                let expected = self.num_features();
                if row.len() < expected {
                    return Err(PredictError::TooFewFeatures {
                        expected,
                        actual: row.len(),
                    });
                }

                row.iter()
                    .map(|(name, value)| self.encode_value(name, value))
                    .collect()
            }
        }
    }

    fn encode_value(&self, name: &str, value: &FeatureValue) -> Result<Option<i64>, PredictError> {
        match value {
            FeatureValue::Number(x) if !x.is_finite() => Ok(None),
            FeatureValue::Number(x) => {
                let scaled = (x * self.scale as f64).round();
                if scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
                    return Err(PredictError::ValueOutOfRange(name.to_string()));
                }
                Ok(Some(scaled as i64))
            }
            FeatureValue::Bool(b) => Ok(Some(if *b { self.scale } else { 0 })),
            FeatureValue::Missing => Ok(None),
            FeatureValue::Text(_) => Err(PredictError::NonNumeric {
                feature: name.to_string(),
                kind: value.kind(),
            }),
        }
    }

    /// Perform deterministic inference on an encoded feature vector
    ///
    /// Returns the fixed-point margin: bias plus each tree's
    /// `leaf_value * tree_weight / scale`.
    pub fn score(&self, features: &[Option<i64>]) -> i64 {
        let mut sum = self.bias;

        for tree in &self.trees {
            let weighted = i128::from(tree.evaluate(features)) * i128::from(tree.weight);
            let contribution = weighted / i128::from(self.scale);
            let contribution = i64::try_from(contribution).unwrap_or(if contribution < 0 {
                i64::MIN
            } else {
                i64::MAX
            });
            sum = sum.saturating_add(contribution);
        }

        sum
    }

    /// Score a row and convert to the model's output space
    pub fn predict_row(&self, row: &FeatureRow) -> Result<f64, PredictError> {
        let encoded = self.encode_row(row)?;
        let margin = self.score(&encoded) as f64 / self.post_scale as f64;
        Ok(self.objective.apply(margin))
    }

    /// Serialize model to canonical JSON (sorted keys, no whitespace)
    pub fn to_canonical_json(&self) -> Result<String, ModelError> {
        Ok(to_canonical_json(self)?)
    }

    /// Compute model hash as hex string
    pub fn hash_hex(&self) -> Result<String, ModelError> {
        Ok(hash_canonical_hex(self)?)
    }

    /// Save model to JSON file with canonical serialization
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        let json = self.to_canonical_json()?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate a model from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let json = fs::read_to_string(path)?;
        let model: Model = serde_json::from_str(&json)?;
        model.validate()?;
        Ok(model)
    }
}
