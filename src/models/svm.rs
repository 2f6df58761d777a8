//! SVM с RBF ядром: SMO, one-vs-rest и калибровка Платта

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{argmax_rows, Classifier};
use crate::preprocessing::StandardScaler;
use crate::types::Label;

/// Выше этого размера матрица ядра не строится
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Минимум примеров каждой стороны для калибровки сигмоиды
const MIN_CALIBRATION_SAMPLES: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmConfig {
    /// Регуляризация C
    pub c: f64,
    pub tol: f64,
    /// Максимум проходов SMO
    pub max_iter: usize,
    pub random_state: u64,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            c: 3.0,
            tol: 1e-3,
            max_iter: 300,
            random_state: 42,
        }
    }
}

/// P(класс | f) = 1 / (1 + exp(a * f + b))
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct PlattSigmoid {
    a: f64,
    b: f64,
}

impl PlattSigmoid {
    fn fit(decision: &[f64], positive: &[bool]) -> Option<Self> {
        let n_pos = positive.iter().filter(|&&p| p).count();
        let n_neg = positive.len() - n_pos;
        if n_pos < MIN_CALIBRATION_SAMPLES || n_neg < MIN_CALIBRATION_SAMPLES {
            return None;
        }

        // Целевые значения с поправкой Платта на малые выборки
        let target_pos = (n_pos as f64 + 1.0) / (n_pos as f64 + 2.0);
        let target_neg = 1.0 / (n_neg as f64 + 2.0);
        let targets: Vec<f64> = positive
            .iter()
            .map(|&p| if p { target_pos } else { target_neg })
            .collect();

        let objective = |a: f64, b: f64| -> f64 {
            decision
                .iter()
                .zip(&targets)
                .map(|(&f, &t)| {
                    let z = a * f + b;
                    // -[t log p + (1-t) log(1-p)], p = sigmoid(-z)
                    t * z + softplus(-z)
                })
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((n_neg as f64 + 1.0) / (n_pos as f64 + 1.0)).ln();
        let mut current = objective(a, b);

        for _ in 0..100 {
            let (mut g_a, mut g_b) = (0.0, 0.0);
            let (mut h_aa, mut h_ab, mut h_bb) = (1e-12, 0.0, 1e-12);

            for (&f, &t) in decision.iter().zip(&targets) {
                let p = sigmoid(-(a * f + b));
                let d1 = t - p;
                let d2 = p * (1.0 - p);
                g_a += f * d1;
                g_b += d1;
                h_aa += f * f * d2;
                h_ab += f * d2;
                h_bb += d2;
            }

            if g_a.abs() < 1e-5 && g_b.abs() < 1e-5 {
                break;
            }

            let det = h_aa * h_bb - h_ab * h_ab;
            if det.abs() < 1e-15 {
                break;
            }
            let delta_a = (h_bb * g_a - h_ab * g_b) / det;
            let delta_b = (h_aa * g_b - h_ab * g_a) / det;

            // Backtracking line search
            let mut step = 1.0;
            let mut improved = false;
            while step >= 1e-10 {
                let (next_a, next_b) = (a - step * delta_a, b - step * delta_b);
                let next = objective(next_a, next_b);
                if next < current - 1e-4 * step * (g_a * delta_a + g_b * delta_b) {
                    a = next_a;
                    b = next_b;
                    current = next;
                    improved = true;
                    break;
                }
                step /= 2.0;
            }
            if !improved {
                break;
            }
        }

        if a.is_finite() && b.is_finite() {
            Some(Self { a, b })
        } else {
            None
        }
    }

    fn probability(&self, decision: f64) -> f64 {
        sigmoid(-(self.a * decision + self.b))
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// ln(1 + exp(x)) без переполнения
fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// Бинарная машина «класс против остальных»
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySvm {
    class: usize,
    support_vectors: Array2<f64>,
    /// alpha_i * y_i для опорных векторов
    coefs: Array1<f64>,
    bias: f64,
    platt: Option<PlattSigmoid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmClassifier {
    config: SvmConfig,
    gamma: f64,
    machines: Vec<BinarySvm>,
    calibrated: bool,
}

impl SvmClassifier {
    pub fn new(config: SvmConfig) -> Self {
        Self {
            config,
            gamma: 1.0,
            machines: Vec::new(),
            calibrated: false,
        }
    }

    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.support_vectors.nrows()).sum()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        let n = x.nrows();
        if n != y.len() {
            return Err(PipelineError::InvalidInput(format!(
                "x has {} rows, y has {} labels",
                n,
                y.len()
            )));
        }
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(PipelineError::InvalidInput(format!(
                "{} training samples exceed the SVM kernel matrix limit of {}",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }

        let mut classes: Vec<usize> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(PipelineError::InvalidInput(
                "SVM requires at least 2 distinct classes".to_string(),
            ));
        }

        // gamma = "scale": 1 / (n_features * Var(X))
        let n_values = x.len() as f64;
        let mean = x.sum() / n_values;
        let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n_values;
        self.gamma = if var > 1e-12 {
            1.0 / (x.ncols() as f64 * var)
        } else {
            1.0
        };

        let kernel_matrix = self.kernel_matrix(x);

        let mut machines = Vec::with_capacity(classes.len());
        for &class in &classes {
            let y_binary: Array1<f64> = y.mapv(|v| if v == class { 1.0 } else { -1.0 });
            let seed = self.config.random_state.wrapping_add(class as u64);
            let (alphas, bias) = self.smo_train(&kernel_matrix, &y_binary, seed);

            let support: Vec<usize> = (0..n).filter(|&i| alphas[i] > 1e-8).collect();
            let mut support_vectors = Array2::zeros((support.len(), x.ncols()));
            let mut coefs = Array1::zeros(support.len());
            for (k, &i) in support.iter().enumerate() {
                support_vectors.row_mut(k).assign(&x.row(i));
                coefs[k] = alphas[i] * y_binary[i];
            }

            // Калибровка по решающей функции на обучающей выборке
            let decision: Vec<f64> = (0..n)
                .map(|i| {
                    support
                        .iter()
                        .zip(coefs.iter())
                        .map(|(&j, &c)| c * kernel_matrix[[j, i]])
                        .sum::<f64>()
                        + bias
                })
                .collect();
            let positive: Vec<bool> = y_binary.iter().map(|&v| v > 0.0).collect();
            let platt = PlattSigmoid::fit(&decision, &positive);

            machines.push(BinarySvm {
                class,
                support_vectors,
                coefs,
                bias,
                platt,
            });
        }

        self.calibrated = machines.iter().all(|m| m.platt.is_some());
        if !self.calibrated {
            tracing::warn!("SVM probability calibration skipped: too few samples per class");
        }
        self.machines = machines;
        Ok(())
    }

    /// Упрощенный SMO (случайный выбор второго множителя)
    fn smo_train(&self, k: &Array2<f64>, y: &Array1<f64>, seed: u64) -> (Array1<f64>, f64) {
        let n = y.len();
        let c = self.config.c;
        let tol = self.config.tol;
        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;

        if n <= 1 {
            return (alphas, bias);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let decision = |alphas: &Array1<f64>, bias: f64, idx: usize| -> f64 {
            let mut sum = bias;
            for i in 0..n {
                if alphas[i] != 0.0 {
                    sum += alphas[i] * y[i] * k[[i, idx]];
                }
            }
            sum
        };

        let max_passes = 5;
        let mut passes = 0;
        let mut total_iter = 0;

        while passes < max_passes && total_iter < self.config.max_iter {
            let mut num_changed = 0;

            for i in 0..n {
                let e_i = decision(&alphas, bias, i) - y[i];

                // Нарушены условия KKT
                if (y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0) {
                    let j = loop {
                        let j = rng.gen_range(0..n);
                        if j != i {
                            break j;
                        }
                    };
                    let e_j = decision(&alphas, bias, j) - y[j];

                    let alpha_i_old = alphas[i];
                    let alpha_j_old = alphas[j];

                    let (l, h) = if y[i] != y[j] {
                        ((alpha_j_old - alpha_i_old).max(0.0), (c + alpha_j_old - alpha_i_old).min(c))
                    } else {
                        ((alpha_i_old + alpha_j_old - c).max(0.0), (alpha_i_old + alpha_j_old).min(c))
                    };
                    if (l - h).abs() < 1e-10 {
                        continue;
                    }

                    let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                    if eta >= 0.0 {
                        continue;
                    }

                    alphas[j] = (alpha_j_old - y[j] * (e_i - e_j) / eta).clamp(l, h);
                    if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                        continue;
                    }
                    alphas[i] = alpha_i_old + y[i] * y[j] * (alpha_j_old - alphas[j]);

                    let b1 = bias
                        - e_i
                        - y[i] * (alphas[i] - alpha_i_old) * k[[i, i]]
                        - y[j] * (alphas[j] - alpha_j_old) * k[[i, j]];
                    let b2 = bias
                        - e_j
                        - y[i] * (alphas[i] - alpha_i_old) * k[[i, j]]
                        - y[j] * (alphas[j] - alpha_j_old) * k[[j, j]];

                    bias = if alphas[i] > 0.0 && alphas[i] < c {
                        b1
                    } else if alphas[j] > 0.0 && alphas[j] < c {
                        b2
                    } else {
                        (b1 + b2) / 2.0
                    };

                    num_changed += 1;
                }
            }

            total_iter += 1;
            if num_changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        (alphas, bias)
    }

    fn kernel(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let dist_sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
        (-self.gamma * dist_sq).exp()
    }

    fn kernel_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let mut k = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let val = self.kernel(x.row(i), x.row(j));
                k[[i, j]] = val;
                k[[j, i]] = val;
            }
        }
        k
    }

    /// Значения решающих функций: n x число машин
    fn decision_values(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.machines.is_empty() {
            return Err(PipelineError::InvalidInput("SVM not trained".to_string()));
        }

        let mut scores = Array2::zeros((x.nrows(), self.machines.len()));
        for (i, sample) in x.rows().into_iter().enumerate() {
            for (m, machine) in self.machines.iter().enumerate() {
                let mut sum = machine.bias;
                for (sv, &coef) in machine.support_vectors.rows().into_iter().zip(machine.coefs.iter()) {
                    sum += coef * self.kernel(sv, sample);
                }
                scores[[i, m]] = sum;
            }
        }
        Ok(scores)
    }

    fn calibrated_proba(&self, decision: &Array2<f64>) -> Array2<f64> {
        let mut proba = Array2::zeros((decision.nrows(), Label::COUNT));
        for i in 0..decision.nrows() {
            let mut total = 0.0;
            for (m, machine) in self.machines.iter().enumerate() {
                let p = machine
                    .platt
                    .map(|platt| platt.probability(decision[[i, m]]))
                    .unwrap_or(0.0);
                proba[[i, machine.class]] = p;
                total += p;
            }

            if total > 0.0 {
                for j in 0..Label::COUNT {
                    proba[[i, j]] /= total;
                }
            } else {
                let uniform = 1.0 / self.machines.len() as f64;
                for machine in &self.machines {
                    proba[[i, machine.class]] = uniform;
                }
            }
        }
        proba
    }
}

impl Classifier for SvmClassifier {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let decision = self.decision_values(x)?;
        if self.calibrated {
            return Ok(argmax_rows(&self.calibrated_proba(&decision)));
        }

        // Без калибровки: машина с наибольшим значением решающей функции
        Ok(argmax_rows(&decision).mapv(|m| self.machines[m].class))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        if !self.calibrated {
            return Ok(None);
        }
        let decision = self.decision_values(x)?;
        Ok(Some(self.calibrated_proba(&decision)))
    }

    fn supports_probabilities(&self) -> bool {
        self.calibrated
    }
}

/// Стандартизация + SVM; scaler обучается только на train
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmPipeline {
    scaler: StandardScaler,
    svc: SvmClassifier,
}

impl SvmPipeline {
    pub fn fit(config: SvmConfig, x: &Array2<f64>, y: &Array1<usize>) -> Result<Self> {
        let mut scaler = StandardScaler::new();
        let x_scaled = scaler.fit_transform(x)?;
        let mut svc = SvmClassifier::new(config);
        svc.fit(&x_scaled, y)?;
        Ok(Self { scaler, svc })
    }

    pub fn classifier(&self) -> &SvmClassifier {
        &self.svc
    }
}

impl Classifier for SvmPipeline {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        self.svc.predict(&self.scaler.transform(x)?)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.svc.predict_proba(&self.scaler.transform(x)?)
    }

    fn supports_probabilities(&self) -> bool {
        self.svc.supports_probabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::accuracy;
    use ndarray::array;

    fn three_clusters() -> (Array2<f64>, Array1<usize>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        let centers = [(0.0, 0.0), (4.0, 4.0), (8.0, 0.0)];
        for (class, &(cx, cy)) in centers.iter().enumerate() {
            for k in 0..6 {
                let dx = (k as f64 - 2.5) * 0.1;
                rows.extend_from_slice(&[cx + dx, cy - dx]);
                labels.push(class);
            }
        }
        (Array2::from_shape_vec((18, 2), rows).unwrap(), Array1::from_vec(labels))
    }

    #[test]
    fn test_separable_clusters() {
        let (x, y) = three_clusters();
        let model = SvmPipeline::fit(SvmConfig::default(), &x, &y).unwrap();
        let predictions = model.predict(&x).unwrap();
        assert!(accuracy(&y, &predictions) >= 0.9);
        assert!(model.classifier().n_support_vectors() > 0);
    }

    #[test]
    fn test_calibrated_probabilities_sum_to_one() {
        let (x, y) = three_clusters();
        let model = SvmPipeline::fit(SvmConfig::default(), &x, &y).unwrap();
        assert!(model.supports_probabilities());

        let proba = model.predict_proba(&x).unwrap().unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_too_few_samples_disable_probabilities() {
        let x = array![[0.0, 0.0], [0.1, 0.1], [5.0, 5.0]];
        let y = array![0usize, 0, 1];
        let model = SvmPipeline::fit(SvmConfig::default(), &x, &y).unwrap();

        assert!(!model.supports_probabilities());
        assert!(model.predict_proba(&x).unwrap().is_none());
        assert_eq!(model.predict(&x).unwrap().len(), 3);
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[0.0], [1.0]];
        let y = array![1usize, 1];
        assert!(SvmPipeline::fit(SvmConfig::default(), &x, &y).is_err());
    }

    #[test]
    fn test_platt_sigmoid_is_monotonic() {
        let decision = [-2.0, -1.5, -1.0, -0.5, 0.5, 1.0, 1.5, 2.0];
        let positive = [false, false, false, false, true, true, true, true];
        let platt = PlattSigmoid::fit(&decision, &positive).unwrap();
        assert!(platt.probability(2.0) > platt.probability(-2.0));
        assert!(platt.probability(2.0) > 0.5);
    }

    #[test]
    fn test_platt_fit_reaches_a_minimum() {
        let decision = [-1.8, -1.1, -0.4, 0.3, -0.2, 0.6, 1.2, 1.9];
        let positive = [false, false, false, true, false, true, true, true];
        let platt = PlattSigmoid::fit(&decision, &positive).unwrap();

        let (t_pos, t_neg) = (5.0 / 6.0, 1.0 / 6.0);
        let loss = |a: f64, b: f64| -> f64 {
            decision
                .iter()
                .zip(positive.iter())
                .map(|(&f, &p)| {
                    let t = if p { t_pos } else { t_neg };
                    let z = a * f + b;
                    t * z + softplus(-z)
                })
                .sum()
        };

        let fitted = loss(platt.a, platt.b);
        assert!(fitted <= loss(0.0, 0.0));
        for (da, db) in [(0.05, 0.0), (-0.05, 0.0), (0.0, 0.05), (0.0, -0.05)] {
            assert!(fitted <= loss(platt.a + da, platt.b + db) + 1e-9);
        }
        assert!(platt.a < 0.0);
    }
}
