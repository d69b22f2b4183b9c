use serde::{Deserialize, Serialize};

use super::error::ModelError;

/// Static description of one model input: CSV column, dashboard label and slider bounds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub column: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub optimal_range: &'static str,
    pub help: &'static str,
}

/// Input table in training order. The position of each entry is its column
/// index in the model's record matrix.
pub const FEATURE_SPECS: [FeatureSpec; SolarFeatures::NUM_FEATURES] = [
    FeatureSpec {
        name: "radiation",
        column: "shortwave_radiation_backwards_sfc",
        label: "Radiation",
        unit: "W/m²",
        min: 0.0,
        max: 1200.0,
        default: 100.0,
        optimal_range: "400-800",
        help: "Solar radiation received on the surface",
    },
    FeatureSpec {
        name: "temperature",
        column: "temperature_2_m_above_gnd",
        label: "Temperature",
        unit: "°C",
        min: -10.0,
        max: 50.0,
        default: 25.0,
        optimal_range: "20-30",
        help: "Ambient temperature",
    },
    FeatureSpec {
        name: "humidity",
        column: "relative_humidity_2_m_above_gnd",
        label: "Humidity",
        unit: "%",
        min: 0.0,
        max: 100.0,
        default: 50.0,
        optimal_range: "40-60",
        help: "Relative humidity at 2m above ground",
    },
    FeatureSpec {
        name: "wind_speed",
        column: "wind_speed_10_m_above_gnd",
        label: "Wind Speed",
        unit: "m/s",
        min: 0.0,
        max: 30.0,
        default: 5.0,
        optimal_range: "3-8",
        help: "Wind speed at 10m above ground",
    },
    FeatureSpec {
        name: "cloud_cover",
        column: "total_cloud_cover_sfc",
        label: "Cloud Cover",
        unit: "%",
        min: 0.0,
        max: 100.0,
        default: 20.0,
        optimal_range: "0-30",
        help: "Percentage of sky covered by clouds",
    },
    FeatureSpec {
        name: "incidence",
        column: "angle_of_incidence",
        label: "Angle of Incidence",
        unit: "°",
        min: 0.0,
        max: 90.0,
        default: 30.0,
        optimal_range: "0-45",
        help: "Angle between sun rays and solar panel",
    },
    FeatureSpec {
        name: "zenith",
        column: "zenith",
        label: "Zenith",
        unit: "°",
        min: 0.0,
        max: 90.0,
        default: 30.0,
        optimal_range: "0-45",
        help: "Angle between sun and vertical direction",
    },
];

/// Dataset column holding the regression target.
pub const TARGET_COLUMN: &str = "generated_power_kw";

/// Fixed-size feature vector for power prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolarFeatures {
    pub radiation: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub cloud_cover: f64,
    pub incidence: f64,
    pub zenith: f64,
}

impl SolarFeatures {
    pub const NUM_FEATURES: usize = 7;

    pub fn to_array(&self) -> [f64; Self::NUM_FEATURES] {
        [
            self.radiation,
            self.temperature,
            self.humidity,
            self.wind_speed,
            self.cloud_cover,
            self.incidence,
            self.zenith,
        ]
    }

    pub fn from_array(values: [f64; Self::NUM_FEATURES]) -> Self {
        let [radiation, temperature, humidity, wind_speed, cloud_cover, incidence, zenith] = values;
        Self {
            radiation,
            temperature,
            humidity,
            wind_speed,
            cloud_cover,
            incidence,
            zenith,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl Default for SolarFeatures {
    /// Slider defaults of the dashboard.
    fn default() -> Self {
        let mut values = [0.0; Self::NUM_FEATURES];
        for (value, spec) in values.iter_mut().zip(FEATURE_SPECS.iter()) {
            *value = spec.default;
        }
        Self::from_array(values)
    }
}

/// Ordered list of dataset columns a model was trained on.
///
/// Persisted inside the artifact and checked on load, so a model fitted on a
/// different column order can never be fed slider values positionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub columns: Vec<String>,
    pub target: String,
}

impl FeatureSchema {
    /// Schema compiled into this binary.
    pub fn current() -> Self {
        Self {
            columns: FEATURE_SPECS.iter().map(|s| s.column.to_string()).collect(),
            target: TARGET_COLUMN.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn verify(&self, other: &FeatureSchema) -> Result<(), ModelError> {
        if self == other {
            return Ok(());
        }
        Err(ModelError::SchemaMismatch {
            expected: self.describe(),
            found: other.describe(),
        })
    }

    fn describe(&self) -> String {
        format!("[{}] -> {}", self.columns.join(", "), self.target)
    }
}
