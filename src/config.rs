// Pipeline configuration. Every field has a default, so an empty file (or no
// file) gives the standard run.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LeadScoreError, Result};
use crate::labels::WeakLabelPolicy;
use crate::model::{BoostingParams, ForestParams};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Share of each class held out for model selection.
    pub test_fraction: f64,
    pub seed: u64,
    pub top_n: usize,
    pub forest: ForestParams,
    pub boosting: BoostingParams,
    pub weak_label: WeakLabelPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            test_fraction: 0.25,
            seed: 42,
            top_n: 20,
            forest: ForestParams::default(),
            boosting: BoostingParams::default(),
            weak_label: WeakLabelPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<PipelineConfig> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = Self::from_yaml(&contents)
            .map_err(|e| LeadScoreError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<PipelineConfig> {
        let config: PipelineConfig =
            serde_saphyr::from_str(yaml).map_err(|e| LeadScoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could use, listing every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            errors.push(format!("test_fraction must be in (0, 1), got {}", self.test_fraction));
        }
        if self.forest.n_trees == 0 {
            errors.push("forest.n_trees must be at least 1".to_string());
        }
        if self.forest.max_depth == 0 {
            errors.push("forest.max_depth must be at least 1".to_string());
        }
        if self.boosting.max_depth == 0 {
            errors.push("boosting.max_depth must be at least 1".to_string());
        }
        if self.boosting.learning_rate.is_nan() || self.boosting.learning_rate <= 0.0 {
            errors.push(format!("boosting.learning_rate must be positive, got {}", self.boosting.learning_rate));
        }
        if self.boosting.lambda < 0.0 {
            errors.push("boosting.lambda must not be negative".to_string());
        }
        let policy = &self.weak_label;
        for (name, q) in [("budget_percentile", policy.budget_percentile), ("area_percentile", policy.area_percentile)] {
            if !(0.0..=1.0).contains(&q) {
                errors.push(format!("weak_label.{} must be in [0, 1], got {}", name, q));
            }
        }
        if policy.min_signals > 5 {
            errors.push(format!("weak_label.min_signals must be at most 5, got {}", policy.min_signals));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LeadScoreError::Config(errors.join("; ")))
        }
    }
}
