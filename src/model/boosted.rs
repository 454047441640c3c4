//! Gradient-boosted tree ensemble on logistic loss.
//!
//! Each round fits one regression tree to the first and second derivatives of
//! the log loss (Newton boosting). Split search runs over per-feature
//! histograms: every column is cut into at most `max_bins` bins once, before
//! the first round, and node statistics are accumulated per bin. Columns with
//! few distinct values cut at midpoints; wider columns cut at quantiles.
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Classifier, ModelKind};
use crate::error::{LeadScoreError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoostingParams {
    pub n_rounds: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// L2 penalty on leaf values.
    pub lambda: f64,
    /// Minimum hessian mass on each side of a split.
    pub min_child_weight: f64,
    pub max_bins: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        BoostingParams {
            n_rounds: 200,
            max_depth: 6,
            learning_rate: 0.1,
            lambda: 1.0,
            min_child_weight: 1.0,
            max_bins: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

/// Regression tree stored as a node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split { feature, threshold, left, right } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// Quantile cut points per feature and the bin index of every train cell.
struct BinnedMatrix {
    /// `cuts[f][b]` is the upper edge of bin `b`; the last bin is open.
    cuts: Vec<Vec<f64>>,
    /// Column-major bin indices.
    bins: Vec<Vec<u16>>,
}

impl BinnedMatrix {
    fn new(x: &Array2<f64>, max_bins: usize) -> BinnedMatrix {
        let max_bins = max_bins.clamp(2, u16::MAX as usize);
        let mut cuts = Vec::with_capacity(x.ncols());
        let mut bins = Vec::with_capacity(x.ncols());
        for col in x.columns() {
            let mut uniq: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
            uniq.sort_by(f64::total_cmp);
            uniq.dedup();

            let edges: Vec<f64> = if uniq.len() <= max_bins {
                uniq.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
            } else {
                let mut e: Vec<f64> = (1..max_bins)
                    .map(|k| uniq[k * (uniq.len() - 1) / max_bins])
                    .collect();
                e.dedup();
                e
            };
            let col_bins = col
                .iter()
                .map(|&v| edges.partition_point(|&c| c < v) as u16)
                .collect();
            cuts.push(edges);
            bins.push(col_bins);
        }
        BinnedMatrix { cuts, bins }
    }

    fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }
}

struct BestSplit {
    feature: usize,
    bin: usize,
    gain: f64,
}

/// Grows one tree on the current gradients and accumulates split gains.
struct TreeBuilder<'a> {
    binned: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoostingParams,
    nodes: Vec<Node>,
    gains: &'a mut [f64],
}

impl TreeBuilder<'_> {
    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn find_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<BestSplit> {
        let mcw = self.params.min_child_weight;
        let parent = self.score(g_total, h_total);
        let mut best: Option<BestSplit> = None;

        for feature in 0..self.binned.cuts.len() {
            let n_bins = self.binned.n_bins(feature);
            if n_bins < 2 {
                continue;
            }
            let col = &self.binned.bins[feature];
            let mut hist = vec![(0.0f64, 0.0f64); n_bins];
            for &r in rows {
                let slot = &mut hist[col[r] as usize];
                slot.0 += self.grad[r];
                slot.1 += self.hess[r];
            }

            let (mut gl, mut hl) = (0.0, 0.0);
            for (bin, &(g, h)) in hist.iter().enumerate().take(n_bins - 1) {
                gl += g;
                hl += h;
                let gr = g_total - gl;
                let hr = h_total - hl;
                if hl < mcw || hr < mcw {
                    continue;
                }
                let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent);
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit { feature, bin, gain });
                }
            }
        }
        best
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| self.hess[r]).sum();
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: self.leaf_weight(g, h) });

        if depth >= self.params.max_depth || rows.len() < 2 {
            return idx;
        }
        let Some(split) = self.find_split(&rows, g, h) else {
            return idx;
        };

        let binned = self.binned;
        let col = &binned.bins[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| (col[r] as usize) <= split.bin);
        self.gains[split.feature] += split.gain;

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: binned.cuts[split.feature][split.bin],
            left,
            right,
        };
        idx
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub struct BoostedTrees {
    base_margin: f64,
    trees: Vec<Tree>,
    gains: Array1<f64>,
}

impl BoostedTrees {
    pub fn fit(x: &Array2<f64>, y: &Array1<usize>, params: &BoostingParams) -> Result<BoostedTrees> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(LeadScoreError::ModelTraining(format!(
                "boosting needs matching non-empty inputs, got {} rows and {} labels",
                n,
                y.len()
            )));
        }
        if params.learning_rate.is_nan() || params.learning_rate <= 0.0 || params.max_depth == 0 {
            return Err(LeadScoreError::ModelTraining(
                "boosting needs a positive learning rate and depth".into(),
            ));
        }

        let targets: Vec<f64> = y.iter().map(|&v| v as f64).collect();
        let prior = (targets.iter().sum::<f64>() / n as f64).clamp(1e-6, 1.0 - 1e-6);
        let base_margin = (prior / (1.0 - prior)).ln();

        let binned = BinnedMatrix::new(x, params.max_bins);
        let mut margin = vec![base_margin; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut gains = vec![0.0; x.ncols()];
        let mut trees = Vec::with_capacity(params.n_rounds);

        for _ in 0..params.n_rounds {
            for i in 0..n {
                let p = sigmoid(margin[i]);
                grad[i] = p - targets[i];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }
            let mut builder = TreeBuilder {
                binned: &binned,
                grad: &grad,
                hess: &hess,
                params,
                nodes: Vec::new(),
                gains: &mut gains,
            };
            builder.grow((0..n).collect(), 0);
            let tree = Tree { nodes: builder.nodes };
            for (i, row) in x.rows().into_iter().enumerate() {
                margin[i] += tree.predict_row(row);
            }
            trees.push(tree);
        }

        if margin.iter().any(|m| !m.is_finite()) {
            return Err(LeadScoreError::ModelTraining("boosting diverged".into()));
        }
        debug!(rounds = trees.len(), rows = n, "fitted boosted trees");
        Ok(BoostedTrees { base_margin, trees, gains: Array1::from(gains) })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn margin(&self, row: ArrayView1<f64>) -> f64 {
        self.base_margin + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }
}

impl Classifier for BoostedTrees {
    fn kind(&self) -> ModelKind {
        ModelKind::GradientBoosting
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| sigmoid(self.margin(row))).collect()
    }

    /// Total split gain per feature, normalized to sum to one.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        let sum = self.gains.sum();
        if sum > 0.0 {
            Some(&self.gains / sum)
        } else {
            Some(self.gains.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn noisy_threshold() -> (Array2<f64>, Array1<usize>) {
        let n = 60;
        let mut x = Array2::<f64>::zeros((n, 3));
        let mut y = Array1::<usize>::zeros(n);
        for i in 0..n {
            let signal = i as f64 / n as f64;
            x[(i, 0)] = signal;
            x[(i, 1)] = ((i * 37) % 11) as f64;
            x[(i, 2)] = 1.0;
            y[i] = usize::from(signal > 0.5);
        }
        (x, y)
    }

    #[test]
    fn test_binning_small_columns_uses_every_value() {
        let x = array![[1.0], [2.0], [2.0], [3.0]];
        let binned = BinnedMatrix::new(&x, 64);
        assert_eq!(binned.cuts[0], vec![1.5, 2.5]);
        assert_eq!(binned.bins[0], vec![0, 1, 1, 2]);
    }

    #[test]
    fn test_binning_caps_bin_count() {
        let x = Array2::from_shape_fn((500, 1), |(i, _)| i as f64);
        let binned = BinnedMatrix::new(&x, 16);
        assert!(binned.n_bins(0) <= 16);
        assert_eq!(binned.bins[0][0], 0);
        assert_eq!(binned.bins[0][499] as usize, binned.n_bins(0) - 1);
    }

    #[test]
    fn test_boosting_learns_threshold() -> Result<()> {
        let (x, y) = noisy_threshold();
        let params = BoostingParams { n_rounds: 30, ..Default::default() };
        let model = BoostedTrees::fit(&x, &y, &params)?;
        assert_eq!(model.n_trees(), 30);
        let p = model.predict_proba(&x);
        for (prob, &label) in p.iter().zip(y.iter()) {
            if label == 1 {
                assert!(*prob > 0.5);
            } else {
                assert!(*prob < 0.5);
            }
        }
        Ok(())
    }

    #[test]
    fn test_importance_goes_to_signal_feature() -> Result<()> {
        let (x, y) = noisy_threshold();
        let params = BoostingParams { n_rounds: 10, ..Default::default() };
        let imp = BoostedTrees::fit(&x, &y, &params)?
            .feature_importances()
            .unwrap_or_default();
        assert!(imp[0] > imp[1]);
        assert_eq!(imp[2], 0.0);
        assert!((imp.sum() - 1.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_single_class_predicts_prior() -> Result<()> {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![1, 1, 1];
        let model = BoostedTrees::fit(&x, &y, &BoostingParams { n_rounds: 5, ..Default::default() })?;
        assert!(model.predict_proba(&x).iter().all(|&p| p > 0.99));
        Ok(())
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let x = array![[0.0], [1.0]];
        let y = array![1];
        assert!(matches!(
            BoostedTrees::fit(&x, &y, &BoostingParams::default()),
            Err(LeadScoreError::ModelTraining(_))
        ));
    }
}
