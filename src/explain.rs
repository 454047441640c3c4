// Feature importance of the selected model, keyed by preprocessed column name.
use serde::Serialize;
use tracing::warn;

use crate::model::Classifier;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Pair the model's weights with `names` and sort by weight, descending.
///
/// Best effort: a model without native weights, or weights that do not line
/// up with the names, gives an empty table.
pub fn extract_importances(model: &dyn Classifier, names: &[String]) -> Vec<FeatureImportance> {
    let Some(weights) = model.feature_importances() else {
        return Vec::new();
    };
    if weights.len() != names.len() {
        warn!(
            weights = weights.len(),
            names = names.len(),
            "importance vector does not match feature names"
        );
        return Vec::new();
    }

    let mut table: Vec<FeatureImportance> = names
        .iter()
        .zip(weights.iter())
        .map(|(name, &w)| FeatureImportance { feature: name.clone(), importance: w })
        .collect();
    table.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelKind;
    use ndarray::{array, Array1, Array2};

    struct Fixed(Option<Array1<f64>>);

    impl Classifier for Fixed {
        fn kind(&self) -> ModelKind {
            ModelKind::RandomForest
        }
        fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
            Array1::zeros(x.nrows())
        }
        fn feature_importances(&self) -> Option<Array1<f64>> {
            self.0.clone()
        }
    }

    struct Opaque;

    impl Classifier for Opaque {
        fn kind(&self) -> ModelKind {
            ModelKind::GradientBoosting
        }
        fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
            Array1::zeros(x.nrows())
        }
    }

    fn names() -> Vec<String> {
        vec!["budget_mid".into(), "source_Referral".into(), "user_type_Family".into()]
    }

    #[test]
    fn test_sorted_descending_with_names() {
        let model = Fixed(Some(array![0.2, 0.5, 0.3]));
        let table = extract_importances(&model, &names());
        let order: Vec<&str> = table.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(order, vec!["source_Referral", "user_type_Family", "budget_mid"]);
        assert_eq!(table[0].importance, 0.5);
    }

    #[test]
    fn test_equal_weights_keep_column_order() {
        let model = Fixed(Some(array![0.0, 0.0, 1.0]));
        let table = extract_importances(&model, &names());
        assert_eq!(table[1].feature, "budget_mid");
        assert_eq!(table[2].feature, "source_Referral");
    }

    #[test]
    fn test_models_without_weights_give_empty_table() {
        assert!(extract_importances(&Opaque, &names()).is_empty());
        let short = Fixed(Some(array![1.0]));
        assert!(extract_importances(&short, &names()).is_empty());
    }
}
