//! Decision tree structures for GBDT inference
//!
//! Provides deterministic integer-only tree nodes and traversal.
//! Thresholds and feature values share the model's fixed-point scale.

use serde::{Deserialize, Serialize};

fn default_left() -> bool {
    true
}

/// A decision tree node (internal or leaf)
///
/// For internal nodes:
/// - `feature_idx >= 0`: index into the encoded feature vector
/// - `left` and `right` point to child node indices
/// - `default_left` picks the branch for a missing value
///
/// For leaf nodes:
/// - `feature_idx == -1` indicates this is a leaf
/// - `leaf` contains the prediction value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Node {
    /// Node ID (for reference, not used in traversal)
    pub id: i32,

    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    #[serde(rename = "feature_idx", alias = "feature")]
    pub feature_idx: i32,

    /// Threshold value for split (fixed-point integer)
    pub threshold: i64,

    /// Leaf value (Some for leaf nodes, None for internal nodes)
    pub leaf: Option<i64>,

    /// Branch taken when the feature value is missing
    #[serde(default = "default_left")]
    pub default_left: bool,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(id: i32, feature_idx: i32, threshold: i64, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
            default_left: true,
        }
    }

    /// Create a new leaf node
    pub fn leaf(id: i32, value: i64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0,
            leaf: Some(value),
            default_left: true,
        }
    }

    /// Route missing values to the right child instead of the left
    pub fn missing_right(mut self) -> Self {
        self.default_left = false;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }

    pub fn leaf_value(&self) -> Option<i64> {
        self.leaf
    }
}

/// A single decision tree with integer-only nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,

    /// Tree weight for ensemble aggregation (fixed-point integer)
    pub weight: i64,
}

impl Tree {
    pub fn new(nodes: Vec<Node>, weight: i64) -> Self {
        Self { nodes, weight }
    }

    /// Evaluate this tree on an encoded feature vector
    ///
    /// Goes left when `value <= threshold`; `None` follows `default_left`.
    /// A malformed path evaluates to 0.
    pub fn evaluate(&self, features: &[Option<i64>]) -> i64 {
        let mut idx = 0usize;

        // A validated tree reaches a leaf in at most nodes.len() steps.
        for _ in 0..=self.nodes.len() {
            let Some(node) = self.nodes.get(idx) else {
                return 0;
            };

            if node.is_leaf() {
                return node.leaf_value().unwrap_or(0);
            }

            let Some(slot) = usize::try_from(node.feature_idx)
                .ok()
                .and_then(|i| features.get(i))
            else {
                return 0;
            };

            let go_left = match slot {
                Some(value) => *value <= node.threshold,
                None => node.default_left,
            };
            let next = if go_left { node.left } else { node.right };

            match usize::try_from(next) {
                Ok(next) if next < self.nodes.len() => idx = next,
                _ => return 0,
            }
        }

        0
    }

    /// Highest feature index referenced by an internal node
    pub fn max_feature_idx(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter(|n| !n.is_leaf())
            .filter_map(|n| usize::try_from(n.feature_idx).ok())
            .max()
    }

    /// Validate tree structure
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if !node.is_leaf() {
                if node.left < 0 || node.left as usize >= self.nodes.len() {
                    return Err(format!("Node {} has invalid left child: {}", i, node.left));
                }

                if node.right < 0 || node.right as usize >= self.nodes.len() {
                    return Err(format!(
                        "Node {} has invalid right child: {}",
                        i, node.right
                    ));
                }

                if node.feature_idx < 0 {
                    return Err(format!(
                        "Internal node {} has invalid feature index: {}",
                        i, node.feature_idx
                    ));
                }
            } else {
                let Some(value) = node.leaf else {
                    return Err(format!("Leaf node {i} has no leaf value"));
                };
                if value.checked_mul(self.weight).is_none() {
                    return Err(format!(
                        "Leaf node {i} value {value} overflows when scaled by tree weight {}",
                        self.weight
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree::new(
            vec![
                Node::internal(0, 0, 50, 1, 2),
                Node::leaf(1, 100),
                Node::leaf(2, 200),
            ],
            1_000_000,
        )
    }

    #[test]
    fn test_node_creation() {
        let internal = Node::internal(0, 3, 12345, 1, 2);
        assert_eq!(internal.feature_idx, 3);
        assert_eq!(internal.threshold, 12345);
        assert!(internal.default_left);
        assert!(!internal.is_leaf());

        let leaf = Node::leaf(1, -234);
        assert_eq!(leaf.feature_idx, -1);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.leaf_value(), Some(-234));
    }

    #[test]
    fn test_tree_evaluation() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[Some(30)]), 100);
        assert_eq!(tree.evaluate(&[Some(50)]), 100); // Equal goes left
        assert_eq!(tree.evaluate(&[Some(60)]), 200);
    }

    #[test]
    fn missing_value_follows_default_branch() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[None]), 100);

        let mut right = stump();
        right.nodes[0] = right.nodes[0].clone().missing_right();
        assert_eq!(right.evaluate(&[None]), 200);
    }

    #[test]
    fn short_feature_vector_scores_zero() {
        assert_eq!(stump().evaluate(&[]), 0);
    }

    #[test]
    fn cyclic_tree_terminates() {
        let tree = Tree::new(
            vec![Node::internal(0, 0, 50, 0, 0), Node::leaf(1, 1)],
            1_000_000,
        );
        assert_eq!(tree.evaluate(&[Some(1)]), 0);
    }

    #[test]
    fn test_tree_validation() {
        assert!(stump().validate().is_ok());

        let invalid_tree = Tree::new(
            vec![
                Node::internal(0, 0, 50, 5, 2),
                Node::leaf(1, 100),
                Node::leaf(2, 200),
            ],
            1_000_000,
        );
        assert!(invalid_tree.validate().is_err());
        assert!(Tree::new(vec![], 1).validate().is_err());
    }

    #[test]
    fn default_left_is_optional_in_json() {
        let node: Node = serde_json::from_str(
            r#"{"id":0,"left":1,"right":2,"feature":3,"threshold":7,"leaf":null}"#,
        )
        .unwrap();
        assert_eq!(node.feature_idx, 3);
        assert!(node.default_left);
    }

    #[test]
    fn max_feature_idx_ignores_leaves() {
        let tree = Tree::new(
            vec![
                Node::internal(0, 4, 0, 1, 2),
                Node::internal(1, 2, 0, 3, 3),
                Node::leaf(2, 1),
                Node::leaf(3, 2),
            ],
            1,
        );
        assert_eq!(tree.max_feature_idx(), Some(4));
        assert_eq!(Tree::new(vec![Node::leaf(0, 1)], 1).max_feature_idx(), None);
    }
}
