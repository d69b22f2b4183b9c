use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analytics::{rank_importance, RankedFeature};
use crate::ml::model::TrainingReport;
use crate::ml::{FeatureSchema, Regressor, SolarModel};

/// Shared state for the web server.
///
/// The model is loaded once before the server starts and is read-only for
/// the rest of the process, so handlers share it without locking.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<SolarModel>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(model: SolarModel) -> Self {
        Self {
            model: Arc::new(model),
            started_at: Utc::now(),
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_type: "Random Forest Regressor",
            trained_at: self.model.trained_at,
            n_trees: self.model.forest().n_trees(),
            schema: self.model.schema.clone(),
            report: self.model.report.clone(),
            importance: rank_importance(&self.model.feature_importance()),
            loaded_at: self.started_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_type: &'static str,
    pub trained_at: DateTime<Utc>,
    pub n_trees: usize,
    pub schema: FeatureSchema,
    pub report: TrainingReport,
    pub importance: Vec<RankedFeature>,
    pub loaded_at: DateTime<Utc>,
}
