//! Deterministic GBDT (Gradient Boosted Decision Tree) inference
//!
//! Models are JSON artifacts whose thresholds, leaves and bias are integers
//! at a fixed-point `scale`:
//!
//! ```json
//! {
//!   "version": 1,
//!   "scale": 1000000,
//!   "post_scale": 1000000,
//!   "bias": 0,
//!   "objective": "binary:logistic",
//!   "feature_names": ["Glucose", "BloodPressure"],
//!   "trees": [
//!     {
//!       "nodes": [
//!         {"id":0,"left":1,"right":2,"feature":0,"threshold":120000000,"leaf":null},
//!         {"id":1,"left":-1,"right":-1,"feature":-1,"threshold":0,"leaf":-800000},
//!         {"id":2,"left":-1,"right":-1,"feature":-1,"threshold":0,"leaf":900000}
//!       ],
//!       "weight": 1000000
//!     }
//!   ]
//! }
//! ```
//!
//! Tree traversal and accumulation stay in integers; only the final margin
//! is converted to a float for the objective and the response.

pub mod model;
pub mod tree;

pub use model::{Model, ModelError, Objective, SCALE};
pub use tree::{Node, Tree};
