//! Discrimination metrics.
use ndarray::ArrayView1;

use crate::error::{LeadScoreError, Result};

/// Area under the ROC curve of `scores` against binary `labels`.
///
/// Computed from the Mann-Whitney rank statistic; tied scores share their
/// average rank, which matches the trapezoidal ROC area.
pub fn roc_auc(labels: ArrayView1<usize>, scores: ArrayView1<f64>) -> Result<f64> {
    let n = labels.len();
    if n != scores.len() {
        return Err(LeadScoreError::ModelTraining(format!(
            "{} labels but {} scores",
            n,
            scores.len()
        )));
    }
    let n_pos = labels.iter().filter(|&&y| y == 1).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(LeadScoreError::InsufficientData(
            "roc auc needs both classes in the evaluation set".into(),
        ));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut pos_rank_sum = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based: start+1 ..= end
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let tied_pos = order[start..end].iter().filter(|&&i| labels[i] == 1).count();
        pos_rank_sum += avg_rank * tied_pos as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let u = pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    Ok(u / (n_pos * n_neg as f64))
}
