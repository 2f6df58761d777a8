//! Выбор лучшей модели по точности на тестовой выборке

use chrono::{DateTime, Utc};

use crate::types::{BestModelPointer, ModelScore};

/// Максимальная точность; при равенстве побеждает меньший `Algorithm::priority`
/// (RandomForest, затем SVM, затем NeuralNet). Пустой вход дает None.
pub fn select_best(scores: &[ModelScore], run_at: DateTime<Utc>) -> Option<BestModelPointer> {
    scores
        .iter()
        .filter(|s| s.accuracy.is_finite())
        .min_by(|a, b| {
            b.accuracy
                .partial_cmp(&a.accuracy)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.algorithm.priority().cmp(&b.algorithm.priority()))
        })
        .map(|best| BestModelPointer {
            algorithm: best.algorithm,
            accuracy: best.accuracy,
            run_at,
        })
}

/// Сравнительная таблица: по убыванию точности, затем по приоритету
pub fn ranked(scores: &[ModelScore]) -> Vec<ModelScore> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| {
        b.accuracy
            .partial_cmp(&a.accuracy)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.algorithm.priority().cmp(&b.algorithm.priority()))
    });
    sorted
}
