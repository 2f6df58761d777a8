//! Конвейер обучения: загрузка → нормализация → очистка → разбиение → обучение → сохранение

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::selection::ranked;
use crate::models::{select_best, ModelStore, ModelTrainer};
use crate::preprocessing::{
    load_csv, train_test_split, CleaningSummary, DataCleaner, DatasetSource, FeatureNormalizer, SplitPlan,
};
use crate::types::{BestModelPointer, Label, ModelFailure, ModelScore};

/// Итог одного запуска обучения
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub source: Option<PathBuf>,
    pub cleaning: CleaningSummary,
    pub label_counts: BTreeMap<Label, usize>,
    pub split: SplitPlan,
    pub n_train: usize,
    pub n_test: usize,
    /// По убыванию точности
    pub scores: Vec<ModelScore>,
    pub failures: Vec<ModelFailure>,
    pub best: BestModelPointer,
    pub artifact_paths: Vec<PathBuf>,
}

pub fn run_training(config: &PipelineConfig, source: &DatasetSource) -> Result<TrainingReport> {
    tracing::info!("Loading dataset from {}", source.path().display());
    let df = load_csv(source.path())?;
    let mut report = train_from_frame(config, &df)?;
    report.source = Some(source.path().to_path_buf());
    Ok(report)
}

/// Все ошибки уровня данных возникают до записи на диск
pub fn train_from_frame(config: &PipelineConfig, df: &DataFrame) -> Result<TrainingReport> {
    config.validate()?;
    tracing::info!("Dataset shape: {} rows x {} columns", df.height(), df.width());

    let rows = FeatureNormalizer::normalize(df)?;
    let (dataset, cleaning) = DataCleaner::clean(&rows)?;

    let label_counts = dataset.label_counts();
    tracing::info!("Label distribution after cleaning ({} rows):", cleaning.rows_out);
    for (label, count) in &label_counts {
        tracing::info!("  {}: {}", label, count);
    }

    let plan = SplitPlan::plan(&dataset.labels())?;
    if !plan.stratify {
        tracing::warn!("Some class has fewer than 2 samples; splitting without stratification");
    }
    tracing::info!(
        "Split: test fraction {}, {} test rows, stratify = {}",
        plan.test_fraction,
        plan.n_test,
        plan.stratify
    );
    let split = train_test_split(&dataset, &plan, config.random_seed);

    let trainer = ModelTrainer::new(config.clone());
    let outcome = trainer.train_all(&split)?;

    let scores = ranked(&outcome.scores());
    let best = select_best(&scores, Utc::now())
        .ok_or_else(|| PipelineError::AllModelsFailed("no scored model".to_string()))?;

    tracing::info!("Model performance comparison:");
    for score in &scores {
        tracing::info!("  {}: {:.4}", score.algorithm, score.accuracy);
    }
    tracing::info!("Best model: {} ({:.4})", best.algorithm, best.accuracy);

    let store = ModelStore::new(config.models_dir.clone());
    let artifact_paths = store.persist(&outcome.artifacts, &best)?;
    tracing::info!("Models saved to {}", store.dir().display());

    Ok(TrainingReport {
        source: None,
        cleaning,
        label_counts,
        n_train: split.n_train(),
        n_test: split.n_test(),
        split: plan,
        scores,
        failures: outcome.failures,
        best,
        artifact_paths,
    })
}
