// Feature construction: turns raw lead records into batch-relative quality signals.
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::{LeadScoreError, Result};
use crate::io::{LeadRecord, LeadTable};

/// Raw columns every batch must carry.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "budget_min",
    "budget_max",
    "preferred_area",
    "user_type",
    "source",
    "move_in_time",
    "bhk",
];

/// Weights of the hand-tuned composite score.
pub const QUALITY_WEIGHTS: QualityWeights = QualityWeights {
    budget: 0.30,
    area: 0.20,
    user_type: 0.20,
    bhk: 0.10,
    urgency: 0.10,
    source: 0.10,
};

/// Upper bounds of the Low and Medium area tiers.
pub const AREA_TIER_BREAKS: (f64, f64) = (0.02, 0.04);

#[derive(Debug, Clone, Copy)]
pub struct QualityWeights {
    pub budget: f64,
    pub area: f64,
    pub user_type: f64,
    pub bhk: f64,
    pub urgency: f64,
    pub source: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AreaTier { Low, Medium, High }

impl AreaTier {
    pub fn from_popularity(popularity: f64) -> Option<AreaTier> {
        if popularity.is_nan() {
            None
        } else if popularity <= AREA_TIER_BREAKS.0 {
            Some(AreaTier::Low)
        } else if popularity <= AREA_TIER_BREAKS.1 {
            Some(AreaTier::Medium)
        } else {
            Some(AreaTier::High)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AreaTier::Low => "Low",
            AreaTier::Medium => "Medium",
            AreaTier::High => "High",
        }
    }
}

impl fmt::Display for AreaTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn user_type_score(user_type: Option<&str>) -> f64 {
    match user_type {
        Some("Family") => 3.0,
        Some("Working Professionals") => 2.0,
        Some("Company Guest") => 2.0,
        Some("Bachelor") => 1.0,
        _ => 1.0,
    }
}

pub fn move_in_urgency(move_in_time: Option<&str>) -> f64 {
    match move_in_time {
        Some("Immediate") => 4.0,
        Some("Within 15 Days") => 3.0,
        Some("1 Month") => 2.0,
        Some("2 Months") => 1.0,
        _ => 1.0,
    }
}

pub fn source_quality(source: Option<&str>) -> f64 {
    match source {
        Some("Referral") => 4.0,
        Some("Website") | Some("WhatsApp") => 3.0,
        Some("Facebook") | Some("Instagram") => 2.0,
        Some("Google Ads") => 1.0,
        _ => 1.0,
    }
}

/// A lead record extended with its derived signals.
///
/// Derived numeric values are `NaN` when an input they depend on is missing;
/// the preprocessing stage imputes them later.
#[derive(Debug, Clone)]
pub struct LeadFeatures {
    pub record: LeadRecord,
    pub budget_range: f64,
    pub budget_mid: f64,
    pub budget_flexibility: f64,
    pub budget_mid_norm: f64,
    pub budget_range_norm: f64,
    pub area_popularity: f64,
    pub area_tier: Option<AreaTier>,
    pub user_type_score: f64,
    pub bhk_score: f64,
    pub move_in_urgency: f64,
    pub source_quality: f64,
    pub lead_quality_score: f64,
}

/// Numeric model inputs, in design-matrix order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericColumn {
    BudgetMin,
    BudgetMax,
    Bhk,
    BudgetRange,
    BudgetMid,
    BudgetFlexibility,
    BudgetMidNorm,
    BudgetRangeNorm,
    AreaPopularity,
    UserTypeScore,
    BhkScore,
    MoveInUrgency,
    SourceQuality,
    LeadQualityScore,
}

impl NumericColumn {
    pub const ALL: [NumericColumn; 14] = [
        NumericColumn::BudgetMin,
        NumericColumn::BudgetMax,
        NumericColumn::Bhk,
        NumericColumn::BudgetRange,
        NumericColumn::BudgetMid,
        NumericColumn::BudgetFlexibility,
        NumericColumn::BudgetMidNorm,
        NumericColumn::BudgetRangeNorm,
        NumericColumn::AreaPopularity,
        NumericColumn::UserTypeScore,
        NumericColumn::BhkScore,
        NumericColumn::MoveInUrgency,
        NumericColumn::SourceQuality,
        NumericColumn::LeadQualityScore,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NumericColumn::BudgetMin => "budget_min",
            NumericColumn::BudgetMax => "budget_max",
            NumericColumn::Bhk => "bhk",
            NumericColumn::BudgetRange => "budget_range",
            NumericColumn::BudgetMid => "budget_mid",
            NumericColumn::BudgetFlexibility => "budget_flexibility",
            NumericColumn::BudgetMidNorm => "budget_mid_norm",
            NumericColumn::BudgetRangeNorm => "budget_range_norm",
            NumericColumn::AreaPopularity => "area_popularity",
            NumericColumn::UserTypeScore => "user_type_score",
            NumericColumn::BhkScore => "bhk_score",
            NumericColumn::MoveInUrgency => "move_in_urgency",
            NumericColumn::SourceQuality => "source_quality",
            NumericColumn::LeadQualityScore => "lead_quality_score",
        }
    }
}

/// Categorical model inputs, in design-matrix order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoricalColumn {
    PreferredArea,
    UserType,
    Source,
    MoveInTime,
    AreaTier,
}

impl CategoricalColumn {
    pub const ALL: [CategoricalColumn; 5] = [
        CategoricalColumn::PreferredArea,
        CategoricalColumn::UserType,
        CategoricalColumn::Source,
        CategoricalColumn::MoveInTime,
        CategoricalColumn::AreaTier,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CategoricalColumn::PreferredArea => "preferred_area",
            CategoricalColumn::UserType => "user_type",
            CategoricalColumn::Source => "source",
            CategoricalColumn::MoveInTime => "move_in_time",
            CategoricalColumn::AreaTier => "area_tier",
        }
    }
}

fn opt_f64(v: Option<f64>) -> f64 {
    v.unwrap_or(f64::NAN)
}

impl LeadFeatures {
    pub fn numeric(&self, column: NumericColumn) -> f64 {
        match column {
            NumericColumn::BudgetMin => opt_f64(self.record.budget_min),
            NumericColumn::BudgetMax => opt_f64(self.record.budget_max),
            NumericColumn::Bhk => opt_f64(self.record.bhk.map(f64::from)),
            NumericColumn::BudgetRange => self.budget_range,
            NumericColumn::BudgetMid => self.budget_mid,
            NumericColumn::BudgetFlexibility => self.budget_flexibility,
            NumericColumn::BudgetMidNorm => self.budget_mid_norm,
            NumericColumn::BudgetRangeNorm => self.budget_range_norm,
            NumericColumn::AreaPopularity => self.area_popularity,
            NumericColumn::UserTypeScore => self.user_type_score,
            NumericColumn::BhkScore => self.bhk_score,
            NumericColumn::MoveInUrgency => self.move_in_urgency,
            NumericColumn::SourceQuality => self.source_quality,
            NumericColumn::LeadQualityScore => self.lead_quality_score,
        }
    }

    pub fn categorical(&self, column: CategoricalColumn) -> Option<&str> {
        match column {
            CategoricalColumn::PreferredArea => self.record.preferred_area.as_deref(),
            CategoricalColumn::UserType => self.record.user_type.as_deref(),
            CategoricalColumn::Source => self.record.source.as_deref(),
            CategoricalColumn::MoveInTime => self.record.move_in_time.as_deref(),
            CategoricalColumn::AreaTier => self.area_tier.map(|t| t.as_str()),
        }
    }
}

/// Min-max bounds of the finite values of a column, if it has any.
fn finite_bounds(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((mi, ma)) => Some((f64::min(mi, v), f64::max(ma, v))),
        })
}

/// Min-max normalize over the batch. A degenerate column maps to 0.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let Some((min, max)) = finite_bounds(values) else {
        return vec![f64::NAN; values.len()];
    };
    let range = max - min;
    values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                f64::NAN
            } else if range > 0.0 {
                (v - min) / range
            } else {
                0.0
            }
        })
        .collect()
}

/// Relative frequency of each area among the leads that name one.
fn area_frequencies(records: &[LeadRecord]) -> HashMap<&str, f64> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for area in records.iter().filter_map(|r| r.preferred_area.as_deref()) {
        *counts.entry(area).or_insert(0) += 1;
    }
    let total: usize = counts.values().sum();
    counts
        .into_iter()
        .map(|(area, n)| (area, n as f64 / total as f64))
        .collect()
}

pub fn validate_schema(table: &LeadTable) -> Result<()> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !table.has_column(c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(LeadScoreError::Schema(format!(
            "missing required column(s): {}",
            missing.join(", ")
        )))
    }
}

/// Derive the feature table for a whole batch.
///
/// Normalized budgets and area popularity are relative to this batch, so the
/// same lead gets different values in a different batch.
pub fn build_features(table: &LeadTable) -> Result<Vec<LeadFeatures>> {
    validate_schema(table)?;
    let records = &table.records;

    let budget_range: Vec<f64> = records
        .iter()
        .map(|r| opt_f64(r.budget_max) - opt_f64(r.budget_min))
        .collect();
    let budget_mid: Vec<f64> = records
        .iter()
        .map(|r| (opt_f64(r.budget_min) + opt_f64(r.budget_max)) / 2.0)
        .collect();
    let mid_norm = min_max_normalize(&budget_mid);
    let range_norm = min_max_normalize(&budget_range);
    let area_freq = area_frequencies(records);

    let w = QUALITY_WEIGHTS;
    let features: Vec<LeadFeatures> = records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let area_popularity = r
                .preferred_area
                .as_deref()
                .and_then(|a| area_freq.get(a).copied())
                .unwrap_or(f64::NAN);
            let user_type_score = user_type_score(r.user_type.as_deref());
            let bhk_score = opt_f64(r.bhk.map(f64::from)) / 3.0;
            let move_in_urgency = move_in_urgency(r.move_in_time.as_deref());
            let source_quality = source_quality(r.source.as_deref());
            let lead_quality_score = w.budget * mid_norm[i]
                + w.area * area_popularity
                + w.user_type * (user_type_score / 3.0)
                + w.bhk * bhk_score
                + w.urgency * (move_in_urgency / 4.0)
                + w.source * (source_quality / 4.0);

            LeadFeatures {
                record: r.clone(),
                budget_range: budget_range[i],
                budget_mid: budget_mid[i],
                budget_flexibility: budget_range[i] / (budget_mid[i] + 1.0),
                budget_mid_norm: mid_norm[i],
                budget_range_norm: range_norm[i],
                area_popularity,
                area_tier: AreaTier::from_popularity(area_popularity),
                user_type_score,
                bhk_score,
                move_in_urgency,
                source_quality,
                lead_quality_score,
            }
        })
        .collect();

    debug!(rows = features.len(), areas = area_freq.len(), "built lead features");
    Ok(features)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn lead(
        budget_min: f64,
        budget_max: f64,
        area: &str,
        user_type: &str,
        bhk: u32,
        move_in: &str,
        source: &str,
    ) -> LeadRecord {
        LeadRecord {
            lead_id: None,
            name: None,
            budget_min: Some(budget_min),
            budget_max: Some(budget_max),
            preferred_area: Some(area.to_string()),
            user_type: Some(user_type.to_string()),
            bhk: Some(bhk),
            move_in_time: Some(move_in.to_string()),
            source: Some(source.to_string()),
        }
    }

    pub(crate) fn three_leads() -> LeadTable {
        LeadTable::from_records(vec![
            lead(20000.0, 30000.0, "X", "Family", 2, "Immediate", "Referral"),
            lead(10000.0, 12000.0, "Y", "Bachelor", 1, "2 Months", "Google Ads"),
            lead(25000.0, 35000.0, "X", "Working Professionals", 3, "1 Month", "Website"),
        ])
    }

    #[test]
    fn test_lookup_scores_for_three_leads() -> Result<()> {
        let feats = build_features(&three_leads())?;
        assert_eq!(feats.len(), 3);
        let uts: Vec<f64> = feats.iter().map(|f| f.user_type_score).collect();
        let urg: Vec<f64> = feats.iter().map(|f| f.move_in_urgency).collect();
        let src: Vec<f64> = feats.iter().map(|f| f.source_quality).collect();
        assert_eq!(uts, vec![3.0, 1.0, 2.0]);
        assert_eq!(urg, vec![4.0, 1.0, 2.0]);
        assert_eq!(src, vec![4.0, 1.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_budget_features() -> Result<()> {
        let feats = build_features(&three_leads())?;
        let first = &feats[0];
        assert_eq!(first.budget_range, 10000.0);
        assert_eq!(first.budget_mid, 25000.0);
        assert!((first.budget_flexibility - 10000.0 / 25001.0).abs() < 1e-12);
        // mids are 25000, 11000, 30000
        assert!((first.budget_mid_norm - 14000.0 / 19000.0).abs() < 1e-12);
        assert_eq!(feats[1].budget_mid_norm, 0.0);
        assert_eq!(feats[2].budget_mid_norm, 1.0);
        // ranges are 10000, 2000, 10000
        assert_eq!(feats[1].budget_range_norm, 0.0);
        assert_eq!(feats[0].budget_range_norm, 1.0);
        Ok(())
    }

    #[test]
    fn test_area_popularity_and_tier() -> Result<()> {
        let feats = build_features(&three_leads())?;
        assert!((feats[0].area_popularity - 2.0 / 3.0).abs() < 1e-12);
        assert!((feats[1].area_popularity - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(feats[0].area_tier, Some(AreaTier::High));

        assert_eq!(AreaTier::from_popularity(0.02), Some(AreaTier::Low));
        assert_eq!(AreaTier::from_popularity(0.03), Some(AreaTier::Medium));
        assert_eq!(AreaTier::from_popularity(0.04), Some(AreaTier::Medium));
        assert_eq!(AreaTier::from_popularity(0.0401), Some(AreaTier::High));
        assert_eq!(AreaTier::from_popularity(f64::NAN), None);
        Ok(())
    }

    #[test]
    fn test_lead_quality_score_weighting() -> Result<()> {
        let feats = build_features(&three_leads())?;
        let f = &feats[0];
        let expected = 0.30 * f.budget_mid_norm
            + 0.20 * (2.0 / 3.0)
            + 0.20 * 1.0
            + 0.10 * (2.0 / 3.0)
            + 0.10 * 1.0
            + 0.10 * 1.0;
        assert!((f.lead_quality_score - expected).abs() < 1e-12);
        assert!(feats[0].lead_quality_score > feats[1].lead_quality_score);
        Ok(())
    }

    #[test]
    fn test_bhk_score_is_uncapped() -> Result<()> {
        let table = LeadTable::from_records(vec![lead(1.0, 2.0, "A", "Family", 6, "Immediate", "Referral")]);
        let feats = build_features(&table)?;
        assert_eq!(feats[0].bhk_score, 2.0);
        Ok(())
    }

    #[test]
    fn test_equal_budgets_normalize_to_zero() -> Result<()> {
        let table = LeadTable::from_records(vec![
            lead(0.0, 0.0, "A", "Family", 1, "Immediate", "Referral"),
            lead(0.0, 0.0, "B", "Bachelor", 1, "1 Month", "Website"),
        ]);
        let feats = build_features(&table)?;
        for f in &feats {
            assert_eq!(f.budget_mid_norm, 0.0);
            assert_eq!(f.budget_range_norm, 0.0);
            assert_eq!(f.budget_flexibility, 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_normalized_budgets_stay_in_unit_interval() -> Result<()> {
        let records: Vec<LeadRecord> = (0..50)
            .map(|i| {
                let lo = 5000.0 + (i * 733 % 97) as f64 * 150.0;
                lead(lo, lo + (i % 7) as f64 * 1000.0, "A", "Family", 2, "Immediate", "Referral")
            })
            .collect();
        let feats = build_features(&LeadTable::from_records(records))?;
        assert_eq!(feats.len(), 50);
        for f in &feats {
            assert!((0.0..=1.0).contains(&f.budget_mid_norm));
            assert!((0.0..=1.0).contains(&f.budget_range_norm));
        }
        Ok(())
    }

    #[test]
    fn test_unmapped_and_missing_categories_default_to_one() -> Result<()> {
        let mut rec = lead(1.0, 2.0, "A", "Student", 1, "Someday", "Billboard");
        rec.preferred_area = None;
        let feats = build_features(&LeadTable::from_records(vec![rec]))?;
        let f = &feats[0];
        assert_eq!(f.user_type_score, 1.0);
        assert_eq!(f.move_in_urgency, 1.0);
        assert_eq!(f.source_quality, 1.0);
        assert!(f.area_popularity.is_nan());
        assert_eq!(f.area_tier, None);
        assert!(f.lead_quality_score.is_nan());
        Ok(())
    }

    #[test]
    fn test_inverted_budget_yields_negative_range() -> Result<()> {
        let table = LeadTable::from_records(vec![lead(30000.0, 20000.0, "A", "Family", 1, "Immediate", "Referral")]);
        let feats = build_features(&table)?;
        assert_eq!(feats[0].budget_range, -10000.0);
        Ok(())
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let table = LeadTable {
            columns: vec!["budget_min".into(), "budget_max".into()],
            records: vec![],
        };
        match build_features(&table) {
            Err(LeadScoreError::Schema(msg)) => {
                assert!(msg.contains("preferred_area"));
                assert!(msg.contains("bhk"));
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }
}
