//! Candidate classifiers and the "train both, keep the better" selection.
pub mod boosted;
pub mod forest;
pub mod metrics;
pub mod split;

use std::fmt;

use ndarray::{Array1, Array2};
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;

pub use boosted::{BoostedTrees, BoostingParams};
pub use forest::{ForestParams, RandomForest};
pub use metrics::roc_auc;
pub use split::{stratified_split, TrainTestSplit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelKind {
    RandomForest,
    GradientBoosting,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::RandomForest => f.write_str("Random Forest"),
            ModelKind::GradientBoosting => f.write_str("Gradient Boosting"),
        }
    }
}

/// A fitted binary classifier over the preprocessed design matrix.
pub trait Classifier: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Positive-class probability for every row of `x`.
    fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64>;

    /// Native per-column weights, when the model family has them.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

/// The model that survived selection.
pub enum TrainedModel {
    Forest(RandomForest),
    Boosted(BoostedTrees),
}

impl TrainedModel {
    pub fn as_classifier(&self) -> &dyn Classifier {
        match self {
            TrainedModel::Forest(m) => m,
            TrainedModel::Boosted(m) => m,
        }
    }
}

/// Why a model was chosen: both held-out scores and the winner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelSelection {
    pub chosen: ModelKind,
    pub forest_auc: f64,
    pub boosted_auc: f64,
}

impl ModelSelection {
    pub fn chosen_auc(&self) -> f64 {
        match self.chosen {
            ModelKind::RandomForest => self.forest_auc,
            ModelKind::GradientBoosting => self.boosted_auc,
        }
    }
}

/// The forest wins only with a strictly higher AUC; ties go to boosting.
pub fn select_winner(forest_auc: f64, boosted_auc: f64) -> ModelKind {
    if forest_auc > boosted_auc {
        ModelKind::RandomForest
    } else {
        ModelKind::GradientBoosting
    }
}

/// Design matrices and labels of both sides of the split.
pub struct SplitData<'a> {
    pub x_train: &'a Array2<f64>,
    pub y_train: &'a Array1<usize>,
    pub x_test: &'a Array2<f64>,
    pub y_test: &'a Array1<usize>,
}

/// Train both families on the train split, score them on the test split and
/// keep the better one. The two fits run concurrently and join before the
/// comparison.
pub fn train_and_select(data: &SplitData<'_>, config: &PipelineConfig) -> Result<(TrainedModel, ModelSelection)> {
    let (forest, boosted) = rayon::join(
        || RandomForest::fit(data.x_train, data.y_train, &config.forest, config.seed),
        || BoostedTrees::fit(data.x_train, data.y_train, &config.boosting),
    );
    let forest = forest?;
    let boosted = boosted?;

    let forest_auc = roc_auc(data.y_test.view(), forest.predict_proba(data.x_test).view())?;
    let boosted_auc = roc_auc(data.y_test.view(), boosted.predict_proba(data.x_test).view())?;
    let chosen = select_winner(forest_auc, boosted_auc);
    info!(forest_auc, boosted_auc, %chosen, "selected model");

    let selection = ModelSelection { chosen, forest_auc, boosted_auc };
    let model = match chosen {
        ModelKind::RandomForest => TrainedModel::Forest(forest),
        ModelKind::GradientBoosting => TrainedModel::Boosted(boosted),
    };
    Ok((model, selection))
}
