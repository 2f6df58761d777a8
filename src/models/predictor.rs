//! Предсказание для одной записи по сохраненному артефакту

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::error::{PipelineError, Result};
use crate::models::store::load_artifact_file;
use crate::models::{argmax_rows, Classifier, ModelArtifact, ModelStore};
use crate::preprocessing::FeatureEngineer;
use crate::types::{Algorithm, BestModelPointer, FeatureVector, Label, Prediction};

/// Откуда взят артефакт
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactResolution {
    /// Явно запрошенный алгоритм
    Preferred(Algorithm),
    /// Лучшая модель последнего обучения
    Pointer(Algorithm),
    /// Первый по имени `*.json` в каталоге
    FirstAvailable(PathBuf),
}

pub struct Predictor {
    store: ModelStore,
    preferred: Option<Algorithm>,
    pointer: Option<BestModelPointer>,
}

impl Predictor {
    pub fn new(store: ModelStore) -> Self {
        Self {
            store,
            preferred: None,
            pointer: None,
        }
    }

    pub fn with_preferred(mut self, algorithm: Option<Algorithm>) -> Self {
        self.preferred = algorithm;
        self
    }

    /// Указатель из только что завершенного обучения вместо `BEST.txt`
    pub fn with_pointer(mut self, pointer: BestModelPointer) -> Self {
        self.pointer = Some(pointer);
        self
    }

    /// Явный алгоритм, затем указатель, затем первый доступный артефакт.
    /// Нечитаемая цель на любом шаге передает ход следующему.
    pub fn resolve(&self) -> Result<(ArtifactResolution, ModelArtifact)> {
        if let Some(algorithm) = self.preferred {
            match self.store.load_artifact(algorithm) {
                Ok(artifact) => return Ok((ArtifactResolution::Preferred(algorithm), artifact)),
                Err(e) => tracing::warn!("Preferred model {} unavailable: {}", algorithm, e),
            }
        }

        let pointed = match &self.pointer {
            Some(pointer) => Ok(pointer.algorithm),
            None => self.store.read_pointer(),
        };
        match pointed {
            Ok(algorithm) => match self.store.load_artifact(algorithm) {
                Ok(artifact) => return Ok((ArtifactResolution::Pointer(algorithm), artifact)),
                Err(e) => tracing::warn!("Best model {} unavailable: {}", algorithm, e),
            },
            Err(e) => tracing::debug!("No best-model pointer: {}", e),
        }

        for path in self.store.available()? {
            match load_artifact_file(&path) {
                Ok(artifact) => return Ok((ArtifactResolution::FirstAvailable(path), artifact)),
                Err(e) => tracing::warn!("Skipping unreadable artifact {}: {}", path.display(), e),
            }
        }

        Err(PipelineError::NoModelAvailable {
            dir: self.store.dir().to_path_buf(),
        })
    }

    /// Каждый вызов читает свою копию артефакта
    pub fn predict(&self, input: &HashMap<String, f64>) -> Result<Prediction> {
        let (resolution, artifact) = self.resolve()?;
        tracing::debug!("Serving prediction from {:?}", resolution);
        predict_with(&artifact, input)
    }
}

/// Входной словарь переупорядочивается по списку признаков артефакта;
/// отсутствующий признак отклоняется до вызова модели
pub fn predict_with(artifact: &ModelArtifact, input: &HashMap<String, f64>) -> Result<Prediction> {
    let values = FeatureVector::from_map(input)?.ordered(&artifact.feature_names)?;
    predict_values(artifact, &values)
}

fn predict_values(artifact: &ModelArtifact, values: &[f64]) -> Result<Prediction> {
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(PipelineError::InvalidInput(format!("non-finite feature value {}", bad)));
    }
    let x = FeatureEngineer::single_row(values);

    if artifact.supports_probabilities {
        if let Some(proba) = artifact.estimator.predict_proba(&x)? {
            let best = argmax_rows(&proba)[0];
            let label = index_to_label(best)?;
            let probabilities: BTreeMap<Label, f64> = Label::ALL
                .iter()
                .map(|&l| (l, proba[[0, l.index()]]))
                .collect();

            return Ok(Prediction {
                label,
                confidence: proba[[0, best]],
                probabilities: Some(probabilities),
                algorithm: artifact.algorithm,
            });
        }
    }

    let predicted = artifact.estimator.predict(&x)?;
    Ok(Prediction {
        label: index_to_label(predicted[0])?,
        confidence: 1.0,
        probabilities: None,
        algorithm: artifact.algorithm,
    })
}

fn index_to_label(index: usize) -> Result<Label> {
    Label::from_index(index)
        .ok_or_else(|| PipelineError::InvalidInput(format!("model produced unknown class index {}", index)))
}
