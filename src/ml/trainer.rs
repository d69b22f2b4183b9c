use std::path::Path;

use tracing::info;

use super::dataset::{chronological_split, load_csv, target_range, SolarDataset};
use super::error::ModelResult;
use super::features::FeatureSchema;
use super::forest::{ForestParams, RandomForestRegressor};
use super::model::{ErrorMetrics, Regressor, SolarModel, TrainingReport};
use super::persistence::ModelArtifact;
use crate::analytics::rank_importance;

/// Fit on the leading rows, evaluate on the trailing `test_fraction`.
pub fn fit_and_evaluate(
    dataset: &SolarDataset,
    params: &ForestParams,
    test_fraction: f64,
) -> ModelResult<SolarModel> {
    let (train, test) = chronological_split(dataset, test_fraction)?;
    info!(
        "Training on {} rows, holding out {} rows (chronological, no shuffle)",
        train.records().nrows(),
        test.records().nrows()
    );

    let forest = RandomForestRegressor::fit(train.records().view(), train.targets().view(), params)?;

    let predictions = forest.predict_batch(test.records().view());
    let metrics = ErrorMetrics::compute(&predictions, test.targets());
    let (target_min, target_max) = target_range(dataset.targets());

    let report = TrainingReport {
        train_samples: train.records().nrows(),
        test_samples: test.records().nrows(),
        mae: metrics.mae,
        rmse: metrics.rmse,
        r2: metrics.r2,
        target_min,
        target_max,
        params: params.clone(),
    };

    SolarModel::new(FeatureSchema::current(), forest, report)
}

/// Full training run: CSV in, artifact out.
pub fn train(
    dataset_path: &Path,
    artifact: &ModelArtifact,
    params: &ForestParams,
    test_fraction: f64,
) -> ModelResult<SolarModel> {
    let dataset = load_csv(dataset_path, &FeatureSchema::current())?;
    let model = fit_and_evaluate(&dataset, params, test_fraction)?;
    log_report(&model);
    artifact.save(&model)?;
    Ok(model)
}

pub fn log_report(model: &SolarModel) {
    let r = &model.report;
    info!("MAE: {:.4}", r.mae);
    info!("RMSE: {:.4}", r.rmse);
    info!("R²: {:.4}", r.r2);
    info!("Max Power: {:.4}", r.target_max);
    info!("Min Power: {:.4}", r.target_min);

    info!("Feature importance:");
    for line in importance_bars(model, 40) {
        info!("  {}", line);
    }
}

/// Horizontal text bar chart, most important feature first.
pub fn importance_bars(model: &dyn Regressor, width: usize) -> Vec<String> {
    rank_importance(&model.feature_importance())
        .iter()
        .map(|f| {
            let len = (f.importance * width as f64).round() as usize;
            format!(
                "{:<20} {:<width$} {:>5.1}%",
                f.label,
                "█".repeat(len),
                f.importance * 100.0,
                width = width
            )
        })
        .collect()
}
