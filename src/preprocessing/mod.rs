/// Модуль подготовки данных

pub mod dataset;
pub mod normalization;
pub mod cleaning;
pub mod split;
pub mod scaler;
pub mod feature_engineering;

pub use dataset::{load_csv, resolve_source, DatasetSource};
pub use normalization::{FeatureNormalizer, NormalizedRow};
pub use cleaning::{CleaningSummary, DataCleaner, StellarTempFill};
pub use split::{train_test_split, SplitPlan, TrainTestSplit};
pub use scaler::StandardScaler;
pub use feature_engineering::FeatureEngineer;
