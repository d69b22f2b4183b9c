use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::ml::features::{SolarFeatures, FEATURE_SPECS};
use crate::ml::Regressor;

/// Installed plant capacity in kW
pub const INSTALLED_CAPACITY_KW: f64 = 3056.79;
/// kg of CO2 avoided per kW of predicted output
pub const CO2_KG_PER_KW: f64 = 0.0007;
/// Average household draw in kW
pub const HOME_CONSUMPTION_KW: f64 = 30.0;
/// Utilization above which the plant counts as running optimally
pub const OPTIMAL_UTILIZATION_PCT: f64 = 50.0;
/// Output band the plant is designed to sit in, in kW
pub const OPTIMAL_OUTPUT_KW: (f64, f64) = (1500.0, 2500.0);

pub fn utilization_pct(prediction_kw: f64) -> f64 {
    prediction_kw / INSTALLED_CAPACITY_KW * 100.0
}

pub fn co2_saved_kg(prediction_kw: f64) -> f64 {
    prediction_kw * CO2_KG_PER_KW
}

pub fn homes_powered(prediction_kw: f64) -> f64 {
    prediction_kw / HOME_CONSUMPTION_KW
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlantStatus {
    Optimal,
    #[serde(rename = "Sub-optimal")]
    SubOptimal,
}

impl PlantStatus {
    pub fn from_utilization(utilization_pct: f64) -> Self {
        if utilization_pct > OPTIMAL_UTILIZATION_PCT {
            PlantStatus::Optimal
        } else {
            PlantStatus::SubOptimal
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlantStatus::Optimal => "Optimal",
            PlantStatus::SubOptimal => "Sub-optimal",
        }
    }
}

/// The four summary cards
#[derive(Debug, Clone, Serialize)]
pub struct PowerMetrics {
    pub predicted_kw: f64,
    pub utilization_pct: f64,
    pub plant_status: PlantStatus,
    pub co2_saved_kg: f64,
    pub homes_powered: f64,
}

impl PowerMetrics {
    pub fn from_prediction(prediction_kw: f64) -> Self {
        let utilization = utilization_pct(prediction_kw);
        Self {
            predicted_kw: prediction_kw,
            utilization_pct: utilization,
            plant_status: PlantStatus::from_utilization(utilization),
            co2_saved_kg: co2_saved_kg(prediction_kw),
            homes_powered: homes_powered(prediction_kw),
        }
    }

    /// Values formatted the way the dashboard cards show them.
    pub fn display(&self) -> [String; 4] {
        [
            format!("{:.2} kW", self.predicted_kw),
            format!("{:.2}%", self.utilization_pct),
            format!("{:.2} kg", self.co2_saved_kg),
            format!("{:.1}", self.homes_powered),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedFeature {
    pub rank: usize,
    pub name: &'static str,
    pub label: &'static str,
    pub importance: f64,
}

/// Pair importances with feature names, most important first.
/// Equal weights keep schema order.
pub fn rank_importance(importance: &[f64; SolarFeatures::NUM_FEATURES]) -> Vec<RankedFeature> {
    let mut ranked: Vec<RankedFeature> = FEATURE_SPECS
        .iter()
        .zip(importance.iter())
        .map(|(spec, &importance)| RankedFeature {
            rank: 0,
            name: spec.name,
            label: spec.label,
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    for (i, f) in ranked.iter_mut().enumerate() {
        f.rank = i + 1;
    }
    ranked
}

#[derive(Debug, Clone, Serialize)]
pub struct RadarPoint {
    pub category: &'static str,
    pub value: f64,
}

/// Input overview on a rough common scale.
pub fn radar_profile(inputs: &SolarFeatures) -> Vec<RadarPoint> {
    vec![
        RadarPoint { category: "Radiation", value: inputs.radiation / 12.0 },
        RadarPoint { category: "Temperature", value: inputs.temperature / 5.0 },
        RadarPoint { category: "Humidity", value: inputs.humidity / 10.0 },
        RadarPoint { category: "Wind Speed", value: inputs.wind_speed * 3.33 },
        RadarPoint { category: "Cloud Cover", value: 100.0 - inputs.cloud_cover },
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct GaugeBand {
    pub from_kw: f64,
    pub to_kw: f64,
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Gauge {
    pub value_kw: f64,
    pub max_kw: f64,
    pub bands: Vec<GaugeBand>,
}

pub fn gauge(prediction_kw: f64) -> Gauge {
    Gauge {
        value_kw: prediction_kw,
        max_kw: INSTALLED_CAPACITY_KW,
        bands: vec![
            GaugeBand { from_kw: 0.0, to_kw: 1000.0, color: "#ffcccc" },
            GaugeBand { from_kw: 1000.0, to_kw: 2000.0, color: "#ffffcc" },
            GaugeBand { from_kw: 2000.0, to_kw: INSTALLED_CAPACITY_KW, color: "#ccffcc" },
        ],
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InputRow {
    pub parameter: String,
    pub value: f64,
    pub optimal_range: &'static str,
}

pub fn input_table(inputs: &SolarFeatures) -> Vec<InputRow> {
    FEATURE_SPECS
        .iter()
        .zip(inputs.to_array())
        .map(|(spec, value)| InputRow {
            parameter: format!("{} ({})", spec.label, spec.unit),
            value,
            optimal_range: spec.optimal_range,
        })
        .collect()
}

/// Everything the result view renders for one request
#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub inputs: SolarFeatures,
    pub metrics: PowerMetrics,
    pub importance: Vec<RankedFeature>,
    pub top_feature: Option<RankedFeature>,
    pub gauge: Gauge,
    pub radar: Vec<RadarPoint>,
    pub input_table: Vec<InputRow>,
}

/// Run one prediction and derive the display data from it.
pub fn forecast(model: &dyn Regressor, inputs: SolarFeatures) -> Forecast {
    let prediction = model.predict(&inputs);
    let importance = rank_importance(&model.feature_importance());

    Forecast {
        id: Uuid::new_v4(),
        generated_at: Utc::now(),
        inputs,
        metrics: PowerMetrics::from_prediction(prediction),
        top_feature: importance.first().cloned(),
        importance,
        gauge: gauge(prediction),
        radar: radar_profile(&inputs),
        input_table: input_table(&inputs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::MockRegressor;

    #[test]
    fn test_full_capacity_scenario() {
        let m = PowerMetrics::from_prediction(3056.79);
        assert_eq!(format!("{:.2}", m.utilization_pct), "100.00");
        assert_eq!(format!("{:.2}", m.co2_saved_kg), "2.14");
        assert_eq!(format!("{:.1}", m.homes_powered), "101.9");
        assert_eq!(m.plant_status, PlantStatus::Optimal);
        assert_eq!(m.display()[0], "3056.79 kW");
    }

    #[test]
    fn test_zero_scenario() {
        let m = PowerMetrics::from_prediction(0.0);
        assert_eq!(m.utilization_pct, 0.0);
        assert_eq!(m.co2_saved_kg, 0.0);
        assert_eq!(m.homes_powered, 0.0);
        assert_eq!(
            m.display(),
            ["0.00 kW".to_string(), "0.00%".to_string(), "0.00 kg".to_string(), "0.0".to_string()]
        );
        assert_eq!(m.plant_status, PlantStatus::SubOptimal);
    }

    #[test]
    fn test_metrics_strictly_increasing() {
        let mut prev = PowerMetrics::from_prediction(0.0);
        for p in [0.5, 10.0, 750.0, 1528.4, 3000.0, 4000.0] {
            let m = PowerMetrics::from_prediction(p);
            assert!(m.utilization_pct > prev.utilization_pct);
            assert!(m.co2_saved_kg > prev.co2_saved_kg);
            assert!(m.homes_powered > prev.homes_powered);
            prev = m;
        }
    }

    #[test]
    fn test_status_threshold() {
        assert_eq!(PlantStatus::from_utilization(50.0), PlantStatus::SubOptimal);
        assert_eq!(PlantStatus::from_utilization(50.01), PlantStatus::Optimal);
        assert_eq!(
            serde_json::to_string(&PlantStatus::SubOptimal).unwrap(),
            "\"Sub-optimal\""
        );
    }

    #[test]
    fn test_rank_importance_descending_with_stable_ties() {
        let ranked = rank_importance(&[0.05, 0.1, 0.1, 0.0, 0.15, 0.2, 0.4]);
        let names: Vec<&str> = ranked.iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec!["zenith", "incidence", "cloud_cover", "temperature", "humidity", "radiation", "wind_speed"]
        );
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[6].rank, 7);
    }

    #[test]
    fn test_radar_profile() {
        let radar = radar_profile(&SolarFeatures::default());
        let values: Vec<f64> = radar.iter().map(|p| p.value).collect();
        assert_eq!(values.len(), 5);
        assert!((values[0] - 100.0 / 12.0).abs() < 1e-12);
        assert_eq!(values[1], 5.0);
        assert_eq!(values[2], 5.0);
        assert!((values[3] - 16.65).abs() < 1e-9);
        assert_eq!(values[4], 80.0);
    }

    #[test]
    fn test_input_table_labels() {
        let rows = input_table(&SolarFeatures::default());
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0].parameter, "Radiation (W/m²)");
        assert_eq!(rows[0].optimal_range, "400-800");
        assert_eq!(rows[6].value, 30.0);
    }

    #[test]
    fn test_forecast_uses_regressor() {
        let mut model = MockRegressor::new();
        model.expect_predict().times(1).returning(|f| f.radiation * 2.0);
        model
            .expect_feature_importance()
            .times(1)
            .returning(|| [0.6, 0.1, 0.05, 0.05, 0.1, 0.05, 0.05]);

        let inputs = SolarFeatures {
            radiation: 764.2,
            ..SolarFeatures::default()
        };
        let f = forecast(&model, inputs);

        assert_eq!(f.metrics.predicted_kw, 1528.4);
        assert_eq!(format!("{:.2}", f.metrics.utilization_pct), "50.00");
        assert_eq!(f.top_feature.as_ref().map(|t| t.label), Some("Radiation"));
        assert_eq!(f.importance.len(), 7);
        assert_eq!(f.gauge.max_kw, INSTALLED_CAPACITY_KW);
        assert_eq!(f.input_table[0].value, 764.2);
    }
}
