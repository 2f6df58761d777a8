/// ML модели и их жизненный цикл: обучение, выбор, хранение, предсказание

pub mod random_forest;
pub mod svm;
pub mod neural_net;
pub mod trainer;
pub mod selection;
pub mod store;
pub mod predictor;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use random_forest::RandomForestClassifier;
pub use svm::{SvmClassifier, SvmConfig, SvmPipeline};
pub use neural_net::{MlpClassifier, MlpConfig, MlpPipeline};
pub use trainer::{ModelArtifact, ModelTrainer, TrainingOutcome};
pub use selection::select_best;
pub use store::ModelStore;
pub use predictor::{ArtifactResolution, Predictor};

/// Общий интерфейс обученных классификаторов.
/// Классы: индексы `Label` в каноническом порядке.
pub trait Classifier {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>>;

    /// Матрица n x 3 в каноническом порядке меток, если модель умеет вероятности
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>>;

    fn supports_probabilities(&self) -> bool;
}

/// Обученный оценщик, сериализуемый внутри артефакта
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model")]
pub enum Estimator {
    RandomForest(RandomForestClassifier),
    Svm(SvmPipeline),
    NeuralNet(MlpPipeline),
}

impl Estimator {
    fn inner(&self) -> &dyn Classifier {
        match self {
            Estimator::RandomForest(model) => model,
            Estimator::Svm(model) => model,
            Estimator::NeuralNet(model) => model,
        }
    }
}

impl Classifier for Estimator {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        self.inner().predict(x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.inner().predict_proba(x)
    }

    fn supports_probabilities(&self) -> bool {
        self.inner().supports_probabilities()
    }
}

/// Доля точных совпадений
pub fn accuracy(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Индекс максимума по строкам; при равенстве меньший индекс
pub fn argmax_rows(proba: &Array2<f64>) -> Array1<usize> {
    proba
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0;
            for (j, &p) in row.iter().enumerate() {
                if p > row[best] {
                    best = j;
                }
            }
            best
        })
        .collect()
}
