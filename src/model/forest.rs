//! Bagged decision-forest classifier built from `linfa-trees` decision trees.
use linfa::prelude::*;
use linfa_trees::{DecisionTree, DecisionTreeParams, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Classifier, ModelKind};
use crate::error::{LeadScoreError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    /// Reweight samples so both classes carry equal total weight.
    pub balanced: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams { n_trees: 200, max_depth: 10, balanced: true }
    }
}

pub struct RandomForest {
    trees: Vec<DecisionTree<f64, usize>>,
    n_features: usize,
}

/// `n / (2 * n_class)` per class, or all ones when unbalanced.
fn class_weights(y: &Array1<usize>, balanced: bool) -> [f32; 2] {
    if !balanced {
        return [1.0, 1.0];
    }
    let n = y.len() as f32;
    let pos = y.iter().filter(|&&v| v == 1).count() as f32;
    let neg = n - pos;
    let weight = |count: f32| if count > 0.0 { n / (2.0 * count) } else { 0.0 };
    [weight(neg), weight(pos)]
}

/// Tree settings for one forest member. Leaf and split minimums are scaled to
/// the lightest sample so that a single row of either class can still form a
/// leaf once the classes are reweighted.
fn tree_params(max_depth: usize, min_sample_weight: f32) -> DecisionTreeParams<f64, usize> {
    DecisionTree::params()
        .split_quality(SplitQuality::Gini)
        .max_depth(Some(max_depth))
        .min_weight_leaf(min_sample_weight * 0.5)
        .min_weight_split(min_sample_weight)
}

impl RandomForest {
    /// Fit every tree on its own bootstrap sample. Tree `t` draws from a
    /// generator seeded with `seed + t`, so the result does not depend on how
    /// rayon schedules the work.
    pub fn fit(x: &Array2<f64>, y: &Array1<usize>, params: &ForestParams, seed: u64) -> Result<RandomForest> {
        let n = x.nrows();
        if n == 0 || params.n_trees == 0 {
            return Err(LeadScoreError::ModelTraining(
                "forest needs at least one row and one tree".into(),
            ));
        }
        let weights = class_weights(y, params.balanced);
        let min_sample_weight = y.iter().map(|&c| weights[c]).fold(f32::MAX, f32::min);

        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                let records = x.select(Axis(0), &sample);
                let targets = y.select(Axis(0), &sample);
                let sample_weights: Array1<f32> = targets.iter().map(|&c| weights[c]).collect();
                let dataset = Dataset::new(records, targets).with_weights(sample_weights);

                tree_params(params.max_depth, min_sample_weight)
                    .fit(&dataset)
                    .map_err(|e| LeadScoreError::ModelTraining(format!("forest tree {}: {}", t, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(trees = trees.len(), rows = n, "fitted random forest");
        Ok(RandomForest { trees, n_features: x.ncols() })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn kind(&self) -> ModelKind {
        ModelKind::RandomForest
    }

    /// Share of trees voting for the positive class. linfa-trees only reports
    /// the majority class of a leaf, so this stands in for the mean leaf class
    /// fraction; the two agree when leaves are pure.
    fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut votes = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            let pred: Array1<usize> = tree.predict(x);
            votes.zip_mut_with(&pred, |v, &p| *v += p as f64);
        }
        votes / self.trees.len() as f64
    }

    /// Mean impurity importance across trees, normalized to sum to one.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        let mut total = Array1::<f64>::zeros(self.n_features);
        for tree in &self.trees {
            let imp = tree.feature_importance();
            for (t, &v) in total.iter_mut().zip(imp.iter()) {
                if v.is_finite() {
                    *t += v;
                }
            }
        }
        let sum = total.sum();
        if sum > 0.0 {
            total /= sum;
        }
        Some(total)
    }
}
