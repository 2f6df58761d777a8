//! Ошибки конвейера обучения и предсказания

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Algorithm;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("dataset acquisition: no readable source among {0:?}")]
    DatasetUnavailable(Vec<PathBuf>),

    #[error("dataset load: {0}")]
    Data(String),

    #[error("cleaning: no usable rows survived cleaning ({rows_in} rows in)")]
    UnusableDataset { rows_in: usize },

    #[error("split planning: only {found} distinct class present after cleaning, need at least 2")]
    InsufficientClasses { found: usize },

    #[error("training {algorithm}: {reason}")]
    ModelTraining { algorithm: Algorithm, reason: String },

    #[error("training: all models failed ({0})")]
    AllModelsFailed(String),

    #[error("prediction: no trained model available in {}", dir.display())]
    NoModelAvailable { dir: PathBuf },

    #[error("prediction: input is missing required feature `{missing}`")]
    SchemaMismatch { missing: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("persist {}: {reason}", path.display())]
    Persist { path: PathBuf, reason: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::Data(err.to_string())
    }
}
