//! Случайный лес поверх деревьев linfa-tree

use linfa::prelude::*;
use linfa_tree::DecisionTree;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{argmax_rows, Classifier};
use crate::types::Label;

/// Дерево и колонки, на которых оно обучено
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForestTree {
    features: Vec<usize>,
    tree: DecisionTree<f64, usize>,
}

/// Бэггинг деревьев решений, каждое на ⌈√n_features⌉ случайных колонках.
/// Масштабирование признаков не нужно: разбиения инвариантны к монотонным преобразованиям.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    pub n_estimators: usize,
    pub random_state: u64,
    trees: Vec<ForestTree>,
}

impl RandomForestClassifier {
    pub fn new(n_estimators: usize, random_state: u64) -> Self {
        Self {
            n_estimators,
            random_state,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Колонки каждого дерева, по возрастанию
    pub fn feature_subsets(&self) -> Vec<&[usize]> {
        self.trees.iter().map(|t| t.features.as_slice()).collect()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(PipelineError::InvalidInput("Empty training set".to_string()));
        }
        if x.ncols() == 0 {
            return Err(PipelineError::InvalidInput("Training set has no features".to_string()));
        }
        if n_samples != y.len() {
            return Err(PipelineError::InvalidInput(format!(
                "x has {} rows, y has {} labels",
                n_samples,
                y.len()
            )));
        }

        let n_features = x.ncols();
        let max_features = max_features(n_features);

        // Каждое дерево получает свой seed, поэтому параллельная сборка детерминирована
        let trees: Vec<ForestTree> = (0..self.n_estimators)
            .into_par_iter()
            .filter_map(|tree_idx| {
                let seed = self.random_state.wrapping_add(tree_idx as u64);
                let mut rng = StdRng::seed_from_u64(seed);

                // Bootstrap выборка
                let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                let mut features = index::sample(&mut rng, n_features, max_features).into_vec();
                features.sort_unstable();

                let x_boot = x.select(Axis(0), &sample).select(Axis(1), &features);
                let y_boot = y.select(Axis(0), &sample);
                let dataset = Dataset::new(x_boot, y_boot);

                match DecisionTree::<f64, usize>::params().fit(&dataset) {
                    Ok(tree) => Some(ForestTree { features, tree }),
                    Err(e) => {
                        tracing::debug!("Tree {} failed to fit: {}", tree_idx, e);
                        None
                    }
                }
            })
            .collect();

        if trees.is_empty() {
            return Err(PipelineError::InvalidInput("No tree could be fitted".to_string()));
        }

        self.trees = trees;
        Ok(())
    }

    /// Доля голосов деревьев за каждый класс
    fn vote_fractions(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::InvalidInput("Random forest not trained".to_string()));
        }

        let all_predictions: Vec<Array1<usize>> = self
            .trees
            .par_iter()
            .map(|t| {
                let pred: Array1<usize> = t.tree.predict(&x.select(Axis(1), &t.features));
                pred
            })
            .collect();

        let mut proba = Array2::zeros((x.nrows(), Label::COUNT));
        for preds in &all_predictions {
            for (i, &class) in preds.iter().enumerate() {
                if class < Label::COUNT {
                    proba[[i, class]] += 1.0;
                }
            }
        }
        proba.mapv_inplace(|v| v / all_predictions.len() as f64);

        Ok(proba)
    }
}

/// sqrt-правило: ⌈√n⌉, минимум одна колонка
fn max_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features.max(1))
}

impl Classifier for RandomForestClassifier {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        Ok(argmax_rows(&self.vote_fractions(x)?))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.vote_fractions(x).map(Some)
    }

    fn supports_probabilities(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::accuracy;
    use ndarray::array;

    fn toy() -> (Array2<f64>, Array1<usize>) {
        let x = array![
            [1.0, 1.0],
            [1.2, 0.9],
            [0.8, 1.1],
            [5.0, 5.0],
            [5.2, 4.8],
            [4.9, 5.1],
            [9.0, 1.0],
            [9.1, 0.8],
            [8.8, 1.2],
        ];
        let y = array![0usize, 0, 0, 1, 1, 1, 2, 2, 2];
        (x, y)
    }

    #[test]
    fn test_classifier_separates_clusters() {
        let (x, y) = toy();
        let mut rf = RandomForestClassifier::new(25, 42);
        rf.fit(&x, &y).unwrap();
        assert_eq!(rf.n_trees(), 25);

        let predictions = rf.predict(&x).unwrap();
        assert!(accuracy(&y, &predictions) >= 0.8);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = toy();
        let mut rf = RandomForestClassifier::new(10, 42);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.dim(), (9, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = toy();
        let mut a = RandomForestClassifier::new(15, 7);
        let mut b = RandomForestClassifier::new(15, 7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(
            a.predict_proba(&x).unwrap().unwrap(),
            b.predict_proba(&x).unwrap().unwrap()
        );
    }

    #[test]
    fn test_each_tree_sees_a_seeded_column_subset() {
        let x = array![
            [1.0, 10.0, 0.5, 5600.0],
            [1.1, 11.0, 0.6, 5650.0],
            [5.0, 90.0, 8.0, 4800.0],
            [5.2, 95.0, 7.5, 4850.0],
            [9.0, 2.0, 30.0, 6900.0],
            [9.1, 2.2, 31.0, 7000.0],
        ];
        let y = array![0usize, 0, 1, 1, 2, 2];

        let mut a = RandomForestClassifier::new(30, 42);
        let mut b = RandomForestClassifier::new(30, 42);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        let subsets = a.feature_subsets();
        assert_eq!(subsets, b.feature_subsets());
        for subset in &subsets {
            assert_eq!(subset.len(), 2);
            assert!(subset.windows(2).all(|w| w[0] < w[1]));
            assert!(subset.iter().all(|&c| c < 4));
        }
        assert!(subsets.iter().any(|s| *s != subsets[0]));
    }

    #[test]
    fn test_max_features_rule() {
        assert_eq!(max_features(4), 2);
        assert_eq!(max_features(10), 4);
        assert_eq!(max_features(1), 1);
    }

    #[test]
    fn test_untrained_forest_errors() {
        let rf = RandomForestClassifier::new(5, 42);
        assert!(rf.predict(&array![[1.0, 2.0]]).is_err());
    }
}
