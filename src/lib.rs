//! KOI Classifier - классификация объектов Kepler (Confirmed / Candidate / False Positive)

pub mod config;
pub mod error;
pub mod types;
pub mod models;
pub mod pipeline;
pub mod preprocessing;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use types::*;
pub use models::*;
pub use preprocessing::*;
pub use pipeline::{run_training, train_from_frame, TrainingReport};
