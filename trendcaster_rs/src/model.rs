//! Classifier seam and the random-forest artifact the forecasts are scored
//! with.
//!
//! The artifact is a JSON export of a trained forest:
//!
//! ```json
//! {
//!   "feature_names": ["Price_Diff", "..."],
//!   "classes": ["Down", "Up"],
//!   "trees": [
//!     { "nodes": [
//!         { "kind": "split", "feature": 4, "threshold": 1.25, "left": 1, "right": 2 },
//!         { "kind": "leaf", "value": [12.0, 3.0] },
//!         { "kind": "leaf", "value": [1.0, 9.0] }
//!     ] }
//!   ]
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::feature::Direction;
use crate::finalize::ModelInput;
use crate::schema::MODEL_INPUT_COLUMNS;

/// Anything that can turn one finalized feature row into a direction.
pub trait Classifier: Send + Sync {
    /// Ordered input columns the classifier was trained on.
    fn feature_names(&self) -> &[String];

    fn predict(&self, input: &ModelInput) -> PipelineResult<Direction>;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Per-class sample weights, aligned with the artifact's `classes`.
        value: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn leaf_for(&self, values: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    // Trained splits compare single-precision features.
                    let x = f64::from(values[*feature] as f32);
                    idx = if x <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { value } => return value,
            }
        }
    }

    fn validate(&self, tree_idx: usize, n_features: usize, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err(format!("tree {tree_idx} has no nodes"));
        }
        let n_nodes = self.nodes.len();
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "tree {tree_idx} node {idx} splits on feature {feature} of {n_features}"
                        ));
                    }
                    // Children are stored after their parent, which also rules out cycles.
                    for child in [*left, *right] {
                        if child <= idx || child >= n_nodes {
                            return Err(format!(
                                "tree {tree_idx} node {idx} points to invalid child {child}"
                            ));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(format!(
                            "tree {tree_idx} leaf {idx} has {} weights for {n_classes} classes",
                            value.len()
                        ));
                    }
                    if value.iter().any(|w| !w.is_finite() || *w < 0.0)
                        || value.iter().sum::<f64>() <= 0.0
                    {
                        return Err(format!("tree {tree_idx} leaf {idx} has unusable weights"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ForestArtifact {
    feature_names: Vec<String>,
    classes: Vec<String>,
    trees: Vec<DecisionTree>,
}

/// Random-forest classifier: class probabilities are averaged over trees
/// and the most probable class wins (first class on ties).
#[derive(Debug, Clone)]
pub struct ForestModel {
    feature_names: Vec<String>,
    classes: Vec<Direction>,
    trees: Vec<DecisionTree>,
    fingerprint: String,
}

impl ForestModel {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let bytes = fs::read(path)
            .map_err(|err| PipelineError::model_load(path, format!("cannot read artifact: {err}")))?;
        let model = Self::from_slice(&bytes, path)?;
        info!(
            path = %path.display(),
            trees = model.trees.len(),
            sha256 = %model.fingerprint,
            "Classifier artifact loaded"
        );
        Ok(model)
    }

    /// Parses artifact bytes; `origin` only labels errors.
    pub fn from_slice(bytes: &[u8], origin: &Path) -> PipelineResult<Self> {
        let fingerprint = hex::encode(Sha256::digest(bytes));
        let artifact: ForestArtifact = serde_json::from_slice(bytes)
            .map_err(|err| PipelineError::model_load(origin, format!("invalid artifact: {err}")))?;
        Self::from_artifact(artifact, fingerprint)
            .map_err(|reason| PipelineError::model_load(origin, reason))
    }

    fn from_artifact(artifact: ForestArtifact, fingerprint: String) -> Result<Self, String> {
        let names = artifact.feature_names.iter().map(String::as_str);
        if names.ne(MODEL_INPUT_COLUMNS.iter().copied()) {
            let position = artifact
                .feature_names
                .iter()
                .zip(MODEL_INPUT_COLUMNS.iter())
                .position(|(got, want)| got != want);
            return Err(format!(
                "feature schema mismatch: artifact has {} columns, pipeline emits {} \
                 (first differing position: {position:?})",
                artifact.feature_names.len(),
                MODEL_INPUT_COLUMNS.len(),
            ));
        }

        let mut classes = Vec::with_capacity(artifact.classes.len());
        for label in &artifact.classes {
            let direction = Direction::parse_label(label)
                .ok_or_else(|| format!("unsupported class label '{label}'"))?;
            if classes.contains(&direction) {
                return Err(format!("class label '{label}' listed twice"));
            }
            classes.push(direction);
        }
        if classes.is_empty() {
            return Err("artifact lists no classes".to_string());
        }

        if artifact.trees.is_empty() {
            return Err("artifact contains no trees".to_string());
        }
        for (idx, tree) in artifact.trees.iter().enumerate() {
            tree.validate(idx, artifact.feature_names.len(), classes.len())?;
        }

        Ok(Self {
            feature_names: artifact.feature_names,
            classes,
            trees: artifact.trees,
            fingerprint,
        })
    }

    /// Hex SHA-256 of the artifact bytes.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn classes(&self) -> &[Direction] {
        &self.classes
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn predict_proba(&self, values: &[f64]) -> Vec<f64> {
        let mut totals = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            let weights = tree.leaf_for(values);
            let sum: f64 = weights.iter().sum();
            for (total, weight) in totals.iter_mut().zip(weights) {
                *total += weight / sum;
            }
        }
        let n_trees = self.trees.len() as f64;
        totals.iter().map(|total| total / n_trees).collect()
    }
}

impl Classifier for ForestModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, input: &ModelInput) -> PipelineResult<Direction> {
        if input.values.len() != self.feature_names.len() {
            return Err(PipelineError::Schema(format!(
                "model expects {} features, input row has {}",
                self.feature_names.len(),
                input.values.len()
            )));
        }
        let proba = self.predict_proba(&input.values);
        let mut best = 0;
        for (idx, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = idx;
            }
        }
        debug!(date = %input.date, probabilities = ?proba, "Forest scored input row");
        Ok(self.classes[best])
    }
}

struct SharedModel {
    path: PathBuf,
    model: Arc<ForestModel>,
}

static SHARED_MODEL: OnceCell<SharedModel> = OnceCell::new();

/// Process-wide classifier, loaded on first use and read-only afterwards.
///
/// Every later call must name the same artifact path.
pub fn shared(path: &Path) -> PipelineResult<Arc<ForestModel>> {
    let entry = SHARED_MODEL.get_or_try_init(|| {
        ForestModel::load(path).map(|model| SharedModel {
            path: path.to_path_buf(),
            model: Arc::new(model),
        })
    })?;
    if entry.path != path {
        return Err(PipelineError::model_load(
            path,
            format!("a model is already loaded from {}", entry.path.display()),
        ));
    }
    Ok(Arc::clone(&entry.model))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(feature: usize, threshold: f64, below: [f64; 2], above: [f64; 2]) -> DecisionTree {
        DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf {
                    value: below.to_vec(),
                },
                TreeNode::Leaf {
                    value: above.to_vec(),
                },
            ],
        }
    }

    fn forest(trees: Vec<DecisionTree>) -> ForestModel {
        ForestModel {
            feature_names: MODEL_INPUT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            classes: vec![Direction::Down, Direction::Up],
            trees,
            fingerprint: String::new(),
        }
    }

    #[test]
    fn probabilities_average_normalized_leaves() {
        let model = forest(vec![
            stump(0, 0.5, [3.0, 1.0], [0.0, 2.0]),
            stump(0, 0.5, [1.0, 1.0], [1.0, 3.0]),
        ]);
        let mut values = vec![0.0; MODEL_INPUT_COLUMNS.len()];
        let low = model.predict_proba(&values);
        assert!((low[0] - 0.625).abs() < 1e-12);
        assert!((low[1] - 0.375).abs() < 1e-12);

        values[0] = 1.0;
        let high = model.predict_proba(&values);
        assert!((high[1] - 0.875).abs() < 1e-12);
    }

    #[test]
    fn ties_resolve_to_first_class() {
        let model = forest(vec![stump(0, 0.5, [1.0, 1.0], [1.0, 1.0])]);
        let input = ModelInput {
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            values: vec![0.0; MODEL_INPUT_COLUMNS.len()],
        };
        assert_eq!(model.predict(&input).unwrap(), Direction::Down);
    }

    #[test]
    fn backward_child_pointer_is_rejected() {
        let tree = DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 0,
                    right: 1,
                },
                TreeNode::Leaf {
                    value: vec![1.0, 0.0],
                },
            ],
        };
        assert!(tree.validate(0, 1, 2).is_err());
    }

    #[test]
    fn leaf_width_must_match_classes() {
        let tree = DecisionTree {
            nodes: vec![TreeNode::Leaf {
                value: vec![1.0, 0.0, 0.0],
            }],
        };
        assert!(tree.validate(0, 1, 2).is_err());
    }
}
