use thiserror::Error;

/// Failures of the dataset, training and artifact layers
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset is missing column '{0}'")]
    MissingColumn(String),

    #[error("row {row}, column '{column}': cannot parse '{value}' as a number")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("dataset contains no rows")]
    EmptyDataset,

    #[error("cannot split {rows} rows with test fraction {fraction}: both halves must be non-empty")]
    SplitTooSmall { rows: usize, fraction: f64 },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("feature schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("model artifact is inconsistent: {0}")]
    InvalidModel(String),

    #[error("unsupported artifact format version {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },

    #[error("artifact serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl ModelError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        ModelError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;
