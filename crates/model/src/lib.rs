//! Tabular model core for tabinfer
//!
//! Modules:
//! - `features`: Feature rows and scalar values
//! - `gbdt`: Integer-only gradient boosted tree ensemble
//! - `predictor`: The `Predictor` trait and the startup model loader
//! - `serde_canon`: Canonical JSON used for model hashing

pub mod features;
pub mod gbdt;
pub mod predictor;
pub mod serde_canon;

pub use features::{FeatureRow, FeatureValue, RowError};
pub use gbdt::{Model, ModelError, Node, Objective, Tree, SCALE};
pub use predictor::{load_predictor, PredictError, Predictor};
