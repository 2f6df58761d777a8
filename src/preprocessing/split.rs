//! Планирование и выполнение train/test разбиения

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::preprocessing::FeatureEngineer;
use crate::types::{Label, TrainingDataset};

/// С этого размера доля теста уменьшается
pub const LARGE_DATASET_ROWS: usize = 100;
pub const LARGE_TEST_FRACTION: f64 = 0.2;
pub const SMALL_TEST_FRACTION: f64 = 0.33;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub n_samples: usize,
    pub test_fraction: f64,
    pub stratify: bool,
    pub n_test: usize,
}

impl SplitPlan {
    /// Падает до разбиения, если классов меньше двух
    pub fn plan(labels: &[Label]) -> Result<Self> {
        let counts = count_labels(labels);
        if counts.len() < 2 {
            return Err(PipelineError::InsufficientClasses { found: counts.len() });
        }

        let n_samples = labels.len();
        let test_fraction = if n_samples >= LARGE_DATASET_ROWS {
            LARGE_TEST_FRACTION
        } else {
            SMALL_TEST_FRACTION
        };
        let stratify = counts.values().all(|&c| c >= 2);
        let n_test = ((n_samples as f64 * test_fraction).round() as usize).clamp(1, n_samples - 1);

        Ok(Self {
            n_samples,
            test_fraction,
            stratify,
            n_test,
        })
    }
}

/// Индексы строк; обе части по возрастанию
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub y_train: Array1<usize>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<usize>,
    pub indices: SplitIndices,
}

impl TrainTestSplit {
    pub fn n_train(&self) -> usize {
        self.y_train.len()
    }

    pub fn n_test(&self) -> usize {
        self.y_test.len()
    }
}

pub fn count_labels(labels: &[Label]) -> BTreeMap<Label, usize> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(*label).or_insert(0) += 1;
    }
    counts
}

/// Детерминированное разбиение: одинаковые вход и seed дают одинаковые индексы
pub fn split_indices(labels: &[Label], plan: &SplitPlan, seed: u64) -> SplitIndices {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = labels.len();

    let mut test = if plan.stratify {
        stratified_test_indices(labels, plan.n_test, &mut rng)
    } else {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        indices.truncate(plan.n_test);
        indices
    };
    test.sort_unstable();

    let mut in_test = vec![false; n];
    for &i in &test {
        in_test[i] = true;
    }
    let train = (0..n).filter(|&i| !in_test[i]).collect();

    SplitIndices { train, test }
}

fn stratified_test_indices(labels: &[Label], n_test: usize, rng: &mut StdRng) -> Vec<usize> {
    let n = labels.len();

    let mut by_class: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(i);
    }

    // Квоты пропорциональны размеру класса; каждый класс остается в train
    let mut quotas: Vec<(Label, usize, usize, f64)> = by_class
        .iter()
        .map(|(label, idx)| {
            let exact = idx.len() as f64 * n_test as f64 / n as f64;
            let quota = (exact.floor() as usize).min(idx.len() - 1);
            (*label, idx.len(), quota, exact - exact.floor())
        })
        .collect();

    let mut remaining = n_test.saturating_sub(quotas.iter().map(|q| q.2).sum::<usize>());

    // Наибольшие остатки; при равенстве канонический порядок меток
    let mut order: Vec<usize> = (0..quotas.len()).collect();
    order.sort_by(|&a, &b| {
        quotas[b].3
            .partial_cmp(&quotas[a].3)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(quotas[a].0.cmp(&quotas[b].0))
    });

    while remaining > 0 {
        let mut assigned = false;
        for &k in &order {
            if remaining == 0 {
                break;
            }
            let (_, count, quota, _) = quotas[k];
            if quota < count - 1 {
                quotas[k].2 += 1;
                remaining -= 1;
                assigned = true;
            }
        }
        if !assigned {
            break;
        }
    }

    let mut test = Vec::with_capacity(n_test);
    for (label, _, quota, _) in quotas {
        if let Some(indices) = by_class.get_mut(&label) {
            indices.shuffle(rng);
            test.extend_from_slice(&indices[..quota]);
        }
    }
    test
}

/// План + разбиение набора в матрицы
pub fn train_test_split(dataset: &TrainingDataset, plan: &SplitPlan, seed: u64) -> TrainTestSplit {
    let indices = split_indices(&dataset.labels(), plan, seed);
    let (x_train, y_train) = FeatureEngineer::select(&dataset.samples, &indices.train);
    let (x_test, y_test) = FeatureEngineer::select(&dataset.samples, &indices.test);

    TrainTestSplit {
        x_train,
        y_train,
        x_test,
        y_test,
        indices,
    }
}
