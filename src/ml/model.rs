use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::error::{ModelError, ModelResult};
use super::forest::{ForestParams, RandomForestRegressor};
use super::features::{FeatureSchema, SolarFeatures};

/// What the dashboard needs from a fitted model
#[cfg_attr(test, mockall::automock)]
pub trait Regressor: Send + Sync {
    /// Predicted plant output in kW
    fn predict(&self, features: &SolarFeatures) -> f64;

    /// Per-feature weights in schema order, each in [0, 1], summing to 1
    fn feature_importance(&self) -> [f64; SolarFeatures::NUM_FEATURES];
}

/// Held-out evaluation of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub train_samples: usize,
    pub test_samples: usize,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub target_min: f64,
    pub target_max: f64,
    pub params: ForestParams,
}

/// Error metrics of predictions against observed targets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl ErrorMetrics {
    pub fn compute(predictions: &Array1<f64>, observed: &Array1<f64>) -> Self {
        let n = observed.len().max(1) as f64;
        let residuals = predictions - observed;
        let mae = residuals.mapv(f64::abs).sum() / n;
        let mse = residuals.mapv(|r| r * r).sum() / n;

        let mean = observed.sum() / n;
        let ss_tot: f64 = observed.iter().map(|y| (y - mean).powi(2)).sum();
        let ss_res = mse * n;
        // sklearn convention: a perfect fit on a constant target scores 1, otherwise 0
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Self {
            mae,
            rmse: mse.sqrt(),
            r2,
        }
    }
}

/// Fitted power model: the forest plus the schema it was trained on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarModel {
    pub schema: FeatureSchema,
    pub trained_at: DateTime<Utc>,
    pub report: TrainingReport,
    forest: RandomForestRegressor,
}

impl SolarModel {
    pub fn new(
        schema: FeatureSchema,
        forest: RandomForestRegressor,
        report: TrainingReport,
    ) -> ModelResult<Self> {
        if forest.n_features() != schema.len() {
            return Err(ModelError::SchemaMismatch {
                expected: format!("{} features", schema.len()),
                found: format!("forest with {} features", forest.n_features()),
            });
        }
        Ok(Self {
            schema,
            trained_at: Utc::now(),
            report,
            forest,
        })
    }

    /// Consistency of a model read from disk: forest width matches the schema
    /// and the forest itself is well formed.
    pub fn validate(&self) -> ModelResult<()> {
        if self.forest.n_features() != self.schema.len() {
            return Err(ModelError::InvalidModel(format!(
                "forest has {} features but schema lists {}",
                self.forest.n_features(),
                self.schema.len()
            )));
        }
        self.forest.validate()
    }

    pub fn forest(&self) -> &RandomForestRegressor {
        &self.forest
    }

    pub fn predict_batch(&self, records: ArrayView2<f64>) -> Array1<f64> {
        self.forest.predict_batch(records)
    }
}

impl Regressor for SolarModel {
    fn predict(&self, features: &SolarFeatures) -> f64 {
        self.forest.predict(&features.to_array())
    }

    fn feature_importance(&self) -> [f64; SolarFeatures::NUM_FEATURES] {
        let mut out = [0.0; SolarFeatures::NUM_FEATURES];
        for (slot, v) in out.iter_mut().zip(self.forest.feature_importance()) {
            *slot = *v;
        }
        out
    }
}

/// Small forest over a synthetic radiation-driven dataset, for tests.
#[cfg(test)]
pub(crate) fn fixture_model() -> SolarModel {
    use ndarray::Array2;

    let x = Array2::from_shape_fn((120, SolarFeatures::NUM_FEATURES), |(i, j)| {
        ((i * (j + 3)) % 97) as f64 * 1.37
    });
    let y = Array1::from_shape_fn(120, |i| x[[i, 0]] * 3.1 - x[[i, 4]] * 0.7 + 0.123);
    let params = ForestParams {
        n_trees: 10,
        max_depth: 6,
        ..ForestParams::default()
    };
    let forest = RandomForestRegressor::fit(x.view(), y.view(), &params).expect("fixture forest");
    let report = TrainingReport {
        train_samples: 120,
        test_samples: 0,
        mae: 0.0,
        rmse: 0.0,
        r2: 1.0,
        target_min: y.iter().cloned().fold(f64::INFINITY, f64::min),
        target_max: y.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        params,
    };
    SolarModel::new(FeatureSchema::current(), forest, report).expect("fixture model")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metrics() {
        let pred = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let obs = Array1::from(vec![1.0, 2.0, 3.0, 8.0]);
        let m = ErrorMetrics::compute(&pred, &obs);
        assert_eq!(m.mae, 1.0);
        assert_eq!(m.rmse, 2.0);
        assert!(m.r2 < 1.0);
    }

    #[test]
    fn test_error_metrics_perfect_constant() {
        let v = Array1::from_elem(5, 500.0);
        let m = ErrorMetrics::compute(&v, &v);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.r2, 1.0);
    }

    #[test]
    fn test_forest_width_must_match_schema() {
        let x = ndarray::Array2::<f64>::zeros((4, 3));
        let y = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let forest = RandomForestRegressor::fit(x.view(), y.view(), &ForestParams::default()).unwrap();
        let report = fixture_model().report;
        assert!(matches!(
            SolarModel::new(FeatureSchema::current(), forest, report),
            Err(ModelError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_model_importance_sums_to_one() {
        let model = fixture_model();
        let imp = model.feature_importance();
        assert!(imp.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }
}
