// End-to-end scoring run: features, weak labels, split, preprocessing, model
// selection, scoring, explainability and assembly, strictly in that order.
use std::time::Instant;

use ndarray::{Array1, Axis};
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::explain::extract_importances;
use crate::features::{build_features, LeadFeatures};
use crate::io::LeadTable;
use crate::labels::label_leads;
use crate::model::{stratified_split, train_and_select, SplitData};
use crate::preprocess::Preprocessor;
use crate::report::{assemble, ScoringReport};
use crate::score::score_rows;
use crate::usage::{UsageEvent, UsageSink};

/// Score a batch. Any stage failure aborts the run; no partial report is
/// returned.
pub fn run(table: &LeadTable, config: &PipelineConfig) -> Result<ScoringReport> {
    let started = Instant::now();
    config.validate()?;
    info!(rows = table.len(), "starting scoring run");

    let features = build_features(table)?;
    let labeled = label_leads(features, &config.weak_label);
    let targets: Vec<usize> = labeled.iter().map(|l| l.target()).collect();

    let split = stratified_split(&targets, config.test_fraction, config.seed)?;
    info!(train = split.train.len(), test = split.test.len(), "split leads");

    let rows_at = |idx: &[usize]| -> Vec<&LeadFeatures> { idx.iter().map(|&i| &labeled[i].features).collect() };
    let train_rows = rows_at(&split.train);
    let test_rows = rows_at(&split.test);
    let all_rows: Vec<&LeadFeatures> = labeled.iter().map(|l| &l.features).collect();

    let preprocessor = Preprocessor::fit(&train_rows)?;
    let x_train = preprocessor.transform(&train_rows)?;
    let x_test = preprocessor.transform(&test_rows)?;
    let x_all = preprocessor.transform(&all_rows)?;

    let y = Array1::from(targets);
    let y_train = y.select(Axis(0), &split.train);
    let y_test = y.select(Axis(0), &split.test);

    let data = SplitData { x_train: &x_train, y_train: &y_train, x_test: &x_test, y_test: &y_test };
    let (model, selection) = train_and_select(&data, config)?;

    let classifier = model.as_classifier();
    let scores = score_rows(classifier, &x_all);
    let importances = extract_importances(classifier, &preprocessor.feature_names());

    let report = assemble(labeled, scores, importances, selection, config.top_n);
    info!(
        rows = report.scored.len(),
        hot = report.tiers.hot,
        warm = report.tiers.warm,
        cold = report.tiers.cold,
        model = %report.selection.chosen,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "scoring run finished"
    );
    Ok(report)
}

/// Like [`run`], then report one `score` usage event to `sink`.
pub fn run_with_usage(
    table: &LeadTable,
    config: &PipelineConfig,
    sink: &dyn UsageSink,
    user: Option<&str>,
) -> Result<ScoringReport> {
    let report = run(table, config)?;
    sink.record(&UsageEvent::score(report.scored.len(), user));
    Ok(report)
}
