// Probability to score and tier.
use std::fmt;

use ndarray::Array2;
use serde::Serialize;

use crate::model::Classifier;

/// Highest score still counted as Cold.
pub const COLD_MAX: f64 = 40.0;
/// Highest score still counted as Warm.
pub const WARM_MAX: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LeadCategory { Cold, Warm, Hot }

impl LeadCategory {
    /// Cold is `[0, 40]`, Warm `(40, 70]`, Hot `(70, 100]`.
    pub fn from_score(score: f64) -> LeadCategory {
        if score <= COLD_MAX {
            LeadCategory::Cold
        } else if score <= WARM_MAX {
            LeadCategory::Warm
        } else {
            LeadCategory::Hot
        }
    }
}

impl fmt::Display for LeadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeadCategory::Cold => f.write_str("Cold"),
            LeadCategory::Warm => f.write_str("Warm"),
            LeadCategory::Hot => f.write_str("Hot"),
        }
    }
}

/// Probability times 100, rounded to one decimal.
pub fn to_score(probability: f64) -> f64 {
    (probability.clamp(0.0, 1.0) * 1000.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LeadScore {
    pub probability: f64,
    pub score: f64,
    pub category: LeadCategory,
}

impl LeadScore {
    pub fn from_probability(probability: f64) -> LeadScore {
        let score = to_score(probability);
        LeadScore { probability, score, category: LeadCategory::from_score(score) }
    }
}

/// Score every row of the full design matrix with the selected model.
pub fn score_rows(model: &dyn Classifier, x: &Array2<f64>) -> Vec<LeadScore> {
    model
        .predict_proba(x)
        .iter()
        .map(|&p| LeadScore::from_probability(p))
        .collect()
}
