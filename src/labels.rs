// Heuristic weak labels.
//
// The lead sheets carry no conversion outcome, so the training target is a
// majority vote over hand-picked quality signals. Every threshold below is a
// policy knob; moving `min_signals` shifts class balance a lot.
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::features::LeadFeatures;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeakLabelPolicy {
    /// Batch percentile (0..=1) that `budget_mid` must reach.
    pub budget_percentile: f64,
    /// Batch percentile (0..=1) that `area_popularity` must reach.
    pub area_percentile: f64,
    pub min_move_in_urgency: f64,
    pub min_source_quality: f64,
    pub preferred_user_types: Vec<String>,
    /// Signals that must hold for a lead to count as high quality.
    pub min_signals: usize,
}

impl Default for WeakLabelPolicy {
    fn default() -> Self {
        WeakLabelPolicy {
            budget_percentile: 0.60,
            area_percentile: 0.60,
            min_move_in_urgency: 3.0,
            min_source_quality: 3.0,
            preferred_user_types: vec!["Family".to_string(), "Working Professionals".to_string()],
            min_signals: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabeledLead {
    pub features: LeadFeatures,
    /// How many of the five signals held.
    pub signals: u8,
    pub is_high_quality: bool,
}

impl LabeledLead {
    pub fn target(&self) -> usize {
        usize::from(self.is_high_quality)
    }
}

/// Percentile with linear interpolation between closest ranks, ignoring NaN.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

fn at_least(value: f64, threshold: Option<f64>) -> bool {
    match threshold {
        Some(t) => !value.is_nan() && value >= t,
        None => false,
    }
}

pub fn label_leads(features: Vec<LeadFeatures>, policy: &WeakLabelPolicy) -> Vec<LabeledLead> {
    let mids: Vec<f64> = features.iter().map(|f| f.budget_mid).collect();
    let pops: Vec<f64> = features.iter().map(|f| f.area_popularity).collect();
    let budget_cut = percentile(&mids, policy.budget_percentile);
    let area_cut = percentile(&pops, policy.area_percentile);

    let labeled: Vec<LabeledLead> = features
        .into_iter()
        .map(|f| {
            let preferred = f
                .record
                .user_type
                .as_deref()
                .map(|u| policy.preferred_user_types.iter().any(|p| p == u))
                .unwrap_or(false);
            let checks = [
                at_least(f.budget_mid, budget_cut),
                at_least(f.area_popularity, area_cut),
                f.move_in_urgency >= policy.min_move_in_urgency,
                f.source_quality >= policy.min_source_quality,
                preferred,
            ];
            let signals = checks.iter().filter(|&&c| c).count() as u8;
            LabeledLead {
                features: f,
                signals,
                is_high_quality: usize::from(signals) >= policy.min_signals,
            }
        })
        .collect();

    let positives = labeled.iter().filter(|l| l.is_high_quality).count();
    info!(
        rows = labeled.len(),
        positives,
        negatives = labeled.len() - positives,
        ?budget_cut,
        ?area_cut,
        "generated weak labels"
    );
    labeled
}
