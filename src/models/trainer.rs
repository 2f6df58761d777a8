//! Обучение трех моделей на одном разбиении

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::{accuracy, Classifier, Estimator, MlpConfig, MlpPipeline, RandomForestClassifier, SvmConfig, SvmPipeline};
use crate::preprocessing::TrainTestSplit;
use crate::types::{feature_names, Algorithm, ModelFailure, ModelScore};

/// Обученная модель с метаданными; сериализуется в `<Algorithm>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub algorithm: Algorithm,
    /// Порядок признаков, в котором модель ждет вход
    pub feature_names: Vec<String>,
    pub accuracy: f64,
    pub supports_probabilities: bool,
    pub trained_at: DateTime<Utc>,
    pub n_train: usize,
    pub n_test: usize,
    pub estimator: Estimator,
}

impl ModelArtifact {
    pub fn score(&self) -> ModelScore {
        ModelScore {
            algorithm: self.algorithm,
            accuracy: self.accuracy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// В порядке Algorithm::ALL
    pub artifacts: Vec<ModelArtifact>,
    pub failures: Vec<ModelFailure>,
}

impl TrainingOutcome {
    pub fn scores(&self) -> Vec<ModelScore> {
        self.artifacts.iter().map(ModelArtifact::score).collect()
    }
}

pub struct ModelTrainer {
    config: PipelineConfig,
}

impl ModelTrainer {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn svm_config(&self) -> SvmConfig {
        SvmConfig {
            c: self.config.svm_c,
            max_iter: self.config.svm_max_iter,
            random_state: self.config.random_seed,
            ..SvmConfig::default()
        }
    }

    pub fn mlp_config(&self) -> MlpConfig {
        MlpConfig {
            hidden_layers: self.config.mlp_hidden_layers.clone(),
            learning_rate: self.config.mlp_learning_rate,
            max_epochs: self.config.mlp_max_epochs,
            batch_size: self.config.mlp_batch_size,
            momentum: self.config.mlp_momentum,
            alpha: self.config.mlp_alpha,
            random_state: self.config.random_seed,
        }
    }

    /// Обучает все модели параллельно. Ошибка одной модели не останавливает остальные;
    /// ошибка возвращается, только если не обучилась ни одна.
    pub fn train_all(&self, split: &TrainTestSplit) -> Result<TrainingOutcome> {
        let results: Vec<(Algorithm, Result<ModelArtifact>)> = Algorithm::ALL
            .par_iter()
            .map(|&algorithm| (algorithm, self.train_one(algorithm, split)))
            .collect();

        let mut artifacts = Vec::new();
        let mut failures = Vec::new();
        for (algorithm, result) in results {
            match result {
                Ok(artifact) => {
                    tracing::info!("{} accuracy: {:.4}", algorithm, artifact.accuracy);
                    artifacts.push(artifact);
                }
                Err(e) => {
                    tracing::warn!("{} failed to train: {}", algorithm, e);
                    failures.push(ModelFailure {
                        algorithm,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if artifacts.is_empty() {
            let reasons = failures
                .iter()
                .map(|f| format!("{}: {}", f.algorithm, f.reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PipelineError::AllModelsFailed(reasons));
        }

        Ok(TrainingOutcome { artifacts, failures })
    }

    pub fn train_one(&self, algorithm: Algorithm, split: &TrainTestSplit) -> Result<ModelArtifact> {
        let fit = |split: &TrainTestSplit| -> Result<Estimator> {
            let estimator = match algorithm {
                Algorithm::RandomForest => {
                    let mut forest = RandomForestClassifier::new(self.config.n_estimators, self.config.random_seed);
                    forest.fit(&split.x_train, &split.y_train)?;
                    Estimator::RandomForest(forest)
                }
                Algorithm::Svm => Estimator::Svm(SvmPipeline::fit(self.svm_config(), &split.x_train, &split.y_train)?),
                Algorithm::NeuralNet => {
                    Estimator::NeuralNet(MlpPipeline::fit(self.mlp_config(), &split.x_train, &split.y_train)?)
                }
            };
            Ok(estimator)
        };

        let wrap = |e: PipelineError| PipelineError::ModelTraining {
            algorithm,
            reason: e.to_string(),
        };

        let estimator = fit(split).map_err(wrap)?;
        let accuracy = evaluate(&estimator, &split.x_test, &split.y_test).map_err(wrap)?;

        Ok(ModelArtifact {
            algorithm,
            feature_names: feature_names(),
            accuracy,
            supports_probabilities: estimator.supports_probabilities(),
            trained_at: Utc::now(),
            n_train: split.n_train(),
            n_test: split.n_test(),
            estimator,
        })
    }
}

fn evaluate(estimator: &Estimator, x_test: &Array2<f64>, y_test: &Array1<usize>) -> Result<f64> {
    let predictions = estimator.predict(x_test)?;
    Ok(accuracy(y_test, &predictions))
}
