//! Stratified train/test partitioning.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{LeadScoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    /// Row indices of the train split, ascending.
    pub train: Vec<usize>,
    /// Row indices of the test split, ascending.
    pub test: Vec<usize>,
}

/// Split binary labels so both sides keep the class ratio.
///
/// Each class sends `round(n_class * test_fraction)` rows to the test side,
/// clamped so both sides get at least one row of every class. Fails when a
/// class is absent or has a single member.
pub fn stratified_split(labels: &[usize], test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &y) in labels.iter().enumerate() {
        match by_class.get_mut(y) {
            Some(bucket) => bucket.push(i),
            None => {
                return Err(LeadScoreError::InsufficientData(format!(
                    "label {} at row {} is not binary",
                    y, i
                )))
            }
        }
    }

    for (class, members) in by_class.iter().enumerate() {
        if members.len() < 2 {
            return Err(LeadScoreError::InsufficientData(format!(
                "class {} has {} example(s); a stratified split needs at least 2 per class",
                class,
                members.len()
            )));
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for mut members in by_class {
        members.shuffle(&mut rng);
        let n = members.len();
        let n_test = ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    Ok(TrainTestSplit { train, test })
}
