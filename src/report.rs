// Terminal artifact of a scoring run.
use serde::Serialize;

use crate::explain::FeatureImportance;
use crate::labels::LabeledLead;
use crate::model::ModelSelection;
use crate::score::{LeadCategory, LeadScore};

/// One exported row: the raw lead, its derived signals, its weak label and
/// its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredLead {
    pub lead_id: Option<String>,
    pub name: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub preferred_area: Option<String>,
    pub user_type: Option<String>,
    pub bhk: Option<u32>,
    pub move_in_time: Option<String>,
    pub source: Option<String>,
    pub budget_range: f64,
    pub budget_mid: f64,
    pub budget_flexibility: f64,
    pub budget_mid_norm: f64,
    pub budget_range_norm: f64,
    pub area_popularity: f64,
    pub area_tier: Option<&'static str>,
    pub user_type_score: f64,
    pub bhk_score: f64,
    pub move_in_urgency: f64,
    pub source_quality: f64,
    pub lead_quality_score: f64,
    pub is_high_quality: u8,
    pub lead_score: f64,
    pub category: LeadCategory,
}

impl ScoredLead {
    pub fn new(lead: LabeledLead, score: LeadScore) -> ScoredLead {
        let f = lead.features;
        let r = f.record;
        ScoredLead {
            lead_id: r.lead_id,
            name: r.name,
            budget_min: r.budget_min,
            budget_max: r.budget_max,
            preferred_area: r.preferred_area,
            user_type: r.user_type,
            bhk: r.bhk,
            move_in_time: r.move_in_time,
            source: r.source,
            budget_range: f.budget_range,
            budget_mid: f.budget_mid,
            budget_flexibility: f.budget_flexibility,
            budget_mid_norm: f.budget_mid_norm,
            budget_range_norm: f.budget_range_norm,
            area_popularity: f.area_popularity,
            area_tier: f.area_tier.map(|t| t.as_str()),
            user_type_score: f.user_type_score,
            bhk_score: f.bhk_score,
            move_in_urgency: f.move_in_urgency,
            source_quality: f.source_quality,
            lead_quality_score: f.lead_quality_score,
            is_high_quality: u8::from(lead.is_high_quality),
            lead_score: score.score,
            category: score.category,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TierCounts {
    pub hot: usize,
    pub warm: usize,
    pub cold: usize,
    pub average_score: f64,
}

impl TierCounts {
    pub fn from_leads(leads: &[ScoredLead]) -> TierCounts {
        let mut counts = TierCounts::default();
        for lead in leads {
            match lead.category {
                LeadCategory::Hot => counts.hot += 1,
                LeadCategory::Warm => counts.warm += 1,
                LeadCategory::Cold => counts.cold += 1,
            }
        }
        if !leads.is_empty() {
            counts.average_score = leads.iter().map(|l| l.lead_score).sum::<f64>() / leads.len() as f64;
        }
        counts
    }
}

#[derive(Debug, Clone)]
pub struct ScoringReport {
    /// Every lead of the batch, in input order.
    pub scored: Vec<ScoredLead>,
    pub top_leads: Vec<ScoredLead>,
    pub importances: Vec<FeatureImportance>,
    pub selection: ModelSelection,
    pub tiers: TierCounts,
}

/// The `n` best leads, highest score first; equal scores keep input order.
pub fn top_n(scored: &[ScoredLead], n: usize) -> Vec<ScoredLead> {
    let mut ranked: Vec<&ScoredLead> = scored.iter().collect();
    ranked.sort_by(|a, b| b.lead_score.total_cmp(&a.lead_score));
    ranked.into_iter().take(n).cloned().collect()
}

pub fn assemble(
    leads: Vec<LabeledLead>,
    scores: Vec<LeadScore>,
    importances: Vec<FeatureImportance>,
    selection: ModelSelection,
    top: usize,
) -> ScoringReport {
    let scored: Vec<ScoredLead> = leads
        .into_iter()
        .zip(scores)
        .map(|(lead, score)| ScoredLead::new(lead, score))
        .collect();
    let top_leads = top_n(&scored, top);
    let tiers = TierCounts::from_leads(&scored);
    ScoringReport { scored, top_leads, importances, selection, tiers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::features::build_features;
    use crate::features::tests::three_leads;
    use crate::labels::{label_leads, WeakLabelPolicy};
    use crate::model::ModelKind;

    fn scored_with(probabilities: &[f64]) -> Result<Vec<ScoredLead>> {
        let mut table = three_leads();
        while table.records.len() < probabilities.len() {
            let next = table.records[table.records.len() % 3].clone();
            table.records.push(next);
        }
        let labeled = label_leads(build_features(&table)?, &WeakLabelPolicy::default());
        Ok(labeled
            .into_iter()
            .zip(probabilities)
            .map(|(l, &p)| ScoredLead::new(l, LeadScore::from_probability(p)))
            .collect())
    }

    #[test]
    fn test_top_n_orders_and_keeps_ties_stable() -> Result<()> {
        let mut scored = scored_with(&[0.2, 0.9, 0.5, 0.9, 0.1])?;
        for (i, s) in scored.iter_mut().enumerate() {
            s.lead_id = Some(format!("L{}", i));
        }
        let top = top_n(&scored, 3);
        let ids: Vec<&str> = top.iter().filter_map(|s| s.lead_id.as_deref()).collect();
        assert_eq!(ids, vec!["L1", "L3", "L2"]);
        Ok(())
    }

    #[test]
    fn test_top_n_never_exceeds_batch() -> Result<()> {
        let scored = scored_with(&[0.3, 0.6, 0.8])?;
        assert_eq!(top_n(&scored, 20).len(), 3);
        let top = top_n(&scored, 20);
        assert!(top.windows(2).all(|w| w[0].lead_score >= w[1].lead_score));
        Ok(())
    }

    #[test]
    fn test_assemble_counts_tiers() -> Result<()> {
        let table = three_leads();
        let labeled = label_leads(build_features(&table)?, &WeakLabelPolicy::default());
        let scores = vec![
            LeadScore::from_probability(0.85),
            LeadScore::from_probability(0.10),
            LeadScore::from_probability(0.55),
        ];
        let selection = ModelSelection { chosen: ModelKind::GradientBoosting, forest_auc: 0.9, boosted_auc: 0.95 };
        let report = assemble(labeled, scores, Vec::new(), selection, 20);
        assert_eq!(report.scored.len(), 3);
        assert_eq!(report.tiers.hot, 1);
        assert_eq!(report.tiers.warm, 1);
        assert_eq!(report.tiers.cold, 1);
        assert!((report.tiers.average_score - 50.0).abs() < 1e-9);
        assert_eq!(report.top_leads[0].lead_score, 85.0);
        assert_eq!(report.scored[0].user_type_score, 3.0);
        assert_eq!(report.scored[0].is_high_quality, 1);
        Ok(())
    }
}
