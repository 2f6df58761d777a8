//! Построение матриц признаков для моделей

use ndarray::{Array1, Array2};

use crate::types::{LabeledSample, N_FEATURES};

pub struct FeatureEngineer;

impl FeatureEngineer {
    /// Матрица признаков (порядок FEATURE_NAMES) и индексы классов
    pub fn design_matrix(samples: &[LabeledSample]) -> (Array2<f64>, Array1<usize>) {
        let n_samples = samples.len();
        let mut features = Array2::zeros((n_samples, N_FEATURES));
        let mut targets = Array1::zeros(n_samples);

        for (i, sample) in samples.iter().enumerate() {
            for (j, value) in sample.features.to_array().iter().enumerate() {
                features[[i, j]] = *value;
            }
            targets[i] = sample.label.index();
        }

        (features, targets)
    }

    /// Подвыборка строк по индексам
    pub fn select(samples: &[LabeledSample], indices: &[usize]) -> (Array2<f64>, Array1<usize>) {
        let subset: Vec<LabeledSample> = indices.iter().map(|&i| samples[i]).collect();
        Self::design_matrix(&subset)
    }

    /// Одна строка в заданном порядке признаков
    pub fn single_row(values: &[f64]) -> Array2<f64> {
        let mut row = Array2::zeros((1, values.len()));
        for (j, value) in values.iter().enumerate() {
            row[[0, j]] = *value;
        }
        row
    }
}
