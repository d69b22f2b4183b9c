pub mod dataset;
pub mod error;
pub mod features;
pub mod forest;
pub mod model;
pub mod persistence;
pub mod trainer;

pub use error::{ModelError, ModelResult};
pub use features::{FeatureSchema, SolarFeatures, FEATURE_SPECS};
pub use forest::ForestParams;
pub use model::{Regressor, SolarModel};
pub use persistence::ModelArtifact;
