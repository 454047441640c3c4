// Imputation and encoding of lead features into a model-ready matrix.
use ndarray::Array2;
use tracing::debug;

use crate::error::{LeadScoreError, Result};
use crate::features::{CategoricalColumn, LeadFeatures, NumericColumn};

/// Fill value for missing categorical cells.
pub const MISSING_CATEGORY: &str = "missing";

#[derive(Debug, Clone, PartialEq)]
pub struct NumericStats {
    pub column: NumericColumn,
    pub median: f64,
    pub mean: f64,
    pub scale: f64,
}

impl NumericStats {
    fn encode(&self, value: f64) -> f64 {
        let v = if value.is_nan() { self.median } else { value };
        (v - self.mean) / self.scale
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryEncoding {
    pub column: CategoricalColumn,
    /// Sorted categories seen at fit time; one output column each.
    pub categories: Vec<String>,
}

impl CategoryEncoding {
    fn position(&self, value: Option<&str>) -> Option<usize> {
        let v = value.unwrap_or(MISSING_CATEGORY);
        self.categories.binary_search_by(|c| c.as_str().cmp(v)).ok()
    }
}

/// Fitted column transform. Reused unchanged for every matrix of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    numeric: Vec<NumericStats>,
    categorical: Vec<CategoryEncoding>,
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn check_finite(column: NumericColumn, value: f64) -> Result<()> {
    if value.is_infinite() {
        return Err(LeadScoreError::Preprocessing(format!(
            "column {} holds a non-finite value",
            column.name()
        )));
    }
    Ok(())
}

fn fit_numeric(rows: &[&LeadFeatures], column: NumericColumn) -> Result<NumericStats> {
    let raw: Vec<f64> = rows.iter().map(|r| r.numeric(column)).collect();
    for &v in &raw {
        check_finite(column, v)?;
    }

    let mut present: Vec<f64> = raw.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.is_empty() {
        return Err(LeadScoreError::Preprocessing(format!(
            "column {} has no values to fit",
            column.name()
        )));
    }
    present.sort_by(f64::total_cmp);
    let med = median(&present);

    let n = raw.len() as f64;
    let filled = || raw.iter().map(|&v| if v.is_nan() { med } else { v });
    let mean = filled().sum::<f64>() / n;
    let var = filled().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    let scale = if std > 0.0 && std.is_finite() { std } else { 1.0 };

    Ok(NumericStats { column, median: med, mean, scale })
}

fn fit_categorical(rows: &[&LeadFeatures], column: CategoricalColumn) -> CategoryEncoding {
    let mut categories: Vec<String> = rows
        .iter()
        .map(|r| r.categorical(column).unwrap_or(MISSING_CATEGORY).to_string())
        .collect();
    categories.sort();
    categories.dedup();
    CategoryEncoding { column, categories }
}

impl Preprocessor {
    /// Learn medians, scaling statistics and category vocabularies from the
    /// fit rows (the train split).
    pub fn fit(rows: &[&LeadFeatures]) -> Result<Preprocessor> {
        if rows.is_empty() {
            return Err(LeadScoreError::Preprocessing("cannot fit on an empty table".into()));
        }
        let numeric = NumericColumn::ALL
            .iter()
            .map(|&c| fit_numeric(rows, c))
            .collect::<Result<Vec<_>>>()?;
        let categorical = CategoricalColumn::ALL
            .iter()
            .map(|&c| fit_categorical(rows, c))
            .collect();

        let pre = Preprocessor { numeric, categorical };
        debug!(rows = rows.len(), width = pre.width(), "fitted preprocessor");
        Ok(pre)
    }

    pub fn width(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(|c| c.categories.len()).sum::<usize>()
    }

    /// Output column names: numeric names, then `<column>_<category>`.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.numeric.iter().map(|s| s.column.name().to_string()).collect();
        for enc in &self.categorical {
            for cat in &enc.categories {
                names.push(format!("{}_{}", enc.column.name(), cat));
            }
        }
        names
    }

    pub fn numeric_stats(&self) -> &[NumericStats] {
        &self.numeric
    }

    pub fn transform(&self, rows: &[&LeadFeatures]) -> Result<Array2<f64>> {
        let mut x = Array2::<f64>::zeros((rows.len(), self.width()));
        for (i, row) in rows.iter().enumerate() {
            for (j, stats) in self.numeric.iter().enumerate() {
                let v = row.numeric(stats.column);
                check_finite(stats.column, v)?;
                x[(i, j)] = stats.encode(v);
            }
            let mut offset = self.numeric.len();
            for enc in &self.categorical {
                if let Some(k) = enc.position(row.categorical(enc.column)) {
                    x[(i, offset + k)] = 1.0;
                }
                offset += enc.categories.len();
            }
        }
        Ok(x)
    }
}
