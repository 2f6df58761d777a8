//! Многослойный перцептрон: ReLU, softmax, SGD с моментом

#![allow(non_snake_case)]

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{argmax_rows, Classifier};
use crate::preprocessing::StandardScaler;
use crate::types::Label;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpConfig {
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    pub momentum: f64,
    /// L2 регуляризация
    pub alpha: f64,
    pub random_state: u64,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 32],
            learning_rate: 0.01,
            max_epochs: 300,
            batch_size: 32,
            momentum: 0.9,
            alpha: 1e-4,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpClassifier {
    config: MlpConfig,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    /// Средняя кросс-энтропия по эпохам
    loss_curve: Vec<f64>,
}

impl MlpClassifier {
    pub fn new(config: MlpConfig) -> Self {
        Self {
            config,
            weights: Vec::new(),
            biases: Vec::new(),
            loss_curve: Vec::new(),
        }
    }

    pub fn loss_curve(&self) -> &[f64] {
        &self.loss_curve
    }

    pub fn fit(&mut self, X: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        let n_samples = X.nrows();
        if n_samples == 0 {
            return Err(PipelineError::InvalidInput("Empty training set".to_string()));
        }
        if n_samples != y.len() {
            return Err(PipelineError::InvalidInput(format!(
                "x has {} rows, y has {} labels",
                n_samples,
                y.len()
            )));
        }
        if y.iter().any(|&class| class >= Label::COUNT) {
            return Err(PipelineError::InvalidInput("label index out of range".to_string()));
        }

        let mut rng = StdRng::seed_from_u64(self.config.random_state);
        self.initialize(X.ncols(), &mut rng);

        // One-hot в каноническом порядке меток
        let mut targets = Array2::<f64>::zeros((n_samples, Label::COUNT));
        for (i, &class) in y.iter().enumerate() {
            targets[[i, class]] = 1.0;
        }

        let mut velocity_w: Vec<Array2<f64>> = self.weights.iter().map(|w| Array2::zeros(w.dim())).collect();
        let mut velocity_b: Vec<Array1<f64>> = self.biases.iter().map(|b| Array1::zeros(b.len())).collect();

        let batch_size = self.config.batch_size.max(1).min(n_samples);
        let mut order: Vec<usize> = (0..n_samples).collect();
        self.loss_curve.clear();

        for epoch in 0..self.config.max_epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let x_batch = X.select(Axis(0), batch);
                let t_batch = targets.select(Axis(0), batch);
                let m = batch.len() as f64;

                let (pre_activations, activations) = self.forward(&x_batch);
                let output = &activations[activations.len() - 1];

                epoch_loss += cross_entropy(output, &t_batch) * m;

                // Градиент softmax + кросс-энтропии
                let mut delta = (output - &t_batch) / m;

                for layer in (0..self.weights.len()).rev() {
                    let grad_w = activations[layer].t().dot(&delta) + &self.weights[layer] * (self.config.alpha / m);
                    let grad_b = delta.sum_axis(Axis(0));

                    if layer > 0 {
                        let mut back = delta.dot(&self.weights[layer].t());
                        back.zip_mut_with(&pre_activations[layer - 1], |d, &z| {
                            if z <= 0.0 {
                                *d = 0.0;
                            }
                        });
                        delta = back;
                    }

                    velocity_w[layer] = &velocity_w[layer] * self.config.momentum - grad_w * self.config.learning_rate;
                    velocity_b[layer] = &velocity_b[layer] * self.config.momentum - grad_b * self.config.learning_rate;
                    self.weights[layer] += &velocity_w[layer];
                    self.biases[layer] += &velocity_b[layer];
                }
            }

            let mean_loss = epoch_loss / n_samples as f64;
            if !mean_loss.is_finite() {
                return Err(PipelineError::InvalidInput(format!(
                    "neural net training diverged at epoch {}",
                    epoch
                )));
            }
            self.loss_curve.push(mean_loss);

            if epoch % 50 == 0 {
                tracing::debug!("MLP epoch {}: loss {:.4}", epoch, mean_loss);
            }
        }

        Ok(())
    }

    /// Glorot uniform для весов, нули для смещений
    fn initialize(&mut self, n_features: usize, rng: &mut StdRng) {
        let mut sizes = Vec::with_capacity(self.config.hidden_layers.len() + 2);
        sizes.push(n_features);
        sizes.extend_from_slice(&self.config.hidden_layers);
        sizes.push(Label::COUNT);

        self.weights.clear();
        self.biases.clear();
        for pair in sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
            let w = Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-bound..bound));
            self.weights.push(w);
            self.biases.push(Array1::zeros(fan_out));
        }
    }

    /// Возвращает (z скрытых слоев, активации всех слоев включая вход)
    fn forward(&self, X: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let n_layers = self.weights.len();
        let mut pre_activations = Vec::with_capacity(n_layers);
        let mut activations = Vec::with_capacity(n_layers + 1);
        activations.push(X.clone());

        for layer in 0..n_layers {
            let z = activations[layer].dot(&self.weights[layer]) + &self.biases[layer];
            if layer + 1 == n_layers {
                activations.push(softmax(&z));
            } else {
                activations.push(z.mapv(|v| v.max(0.0)));
                pre_activations.push(z);
            }
        }

        (pre_activations, activations)
    }

    fn proba(&self, X: &Array2<f64>) -> Result<Array2<f64>> {
        if self.weights.is_empty() {
            return Err(PipelineError::InvalidInput("Neural net not trained".to_string()));
        }
        let expected = self.weights[0].nrows();
        if X.ncols() != expected {
            return Err(PipelineError::InvalidInput(format!(
                "expected {} features, got {}",
                expected,
                X.ncols()
            )));
        }
        let (_, mut activations) = self.forward(X);
        Ok(activations.pop().unwrap_or_else(|| Array2::zeros((X.nrows(), Label::COUNT))))
    }
}

fn softmax(z: &Array2<f64>) -> Array2<f64> {
    let mut out = z.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

fn cross_entropy(proba: &Array2<f64>, targets: &Array2<f64>) -> f64 {
    let n = proba.nrows().max(1) as f64;
    let total: f64 = proba
        .iter()
        .zip(targets.iter())
        .filter(|(_, t)| **t > 0.0)
        .map(|(&p, &t)| -t * p.max(1e-15).ln())
        .sum();
    total / n
}

impl Classifier for MlpClassifier {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        Ok(argmax_rows(&self.proba(x)?))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.proba(x).map(Some)
    }

    fn supports_probabilities(&self) -> bool {
        true
    }
}

/// Стандартизация + MLP; scaler обучается только на train
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpPipeline {
    scaler: StandardScaler,
    mlp: MlpClassifier,
}

impl MlpPipeline {
    pub fn fit(config: MlpConfig, x: &Array2<f64>, y: &Array1<usize>) -> Result<Self> {
        let mut scaler = StandardScaler::new();
        let x_scaled = scaler.fit_transform(x)?;
        let mut mlp = MlpClassifier::new(config);
        mlp.fit(&x_scaled, y)?;
        Ok(Self { scaler, mlp })
    }

    pub fn classifier(&self) -> &MlpClassifier {
        &self.mlp
    }
}

impl Classifier for MlpPipeline {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        self.mlp.predict(&self.scaler.transform(x)?)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.mlp.predict_proba(&self.scaler.transform(x)?)
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

    fn small_config() -> MlpConfig {
        MlpConfig {
            hidden_layers: vec![8],
            max_epochs: 200,
            batch_size: 4,
            ..MlpConfig::default()
        }
    }

    fn clusters() -> (Array2<f64>, Array1<usize>) {
        let x = array![
            [0.0, 0.0],
            [0.2, 0.1],
            [0.1, 0.3],
            [3.0, 3.0],
            [3.1, 2.8],
            [2.9, 3.2],
            [6.0, 0.0],
            [6.2, 0.1],
            [5.9, 0.2],
        ];
        let y = array![0usize, 0, 0, 1, 1, 1, 2, 2, 2];
        (x, y)
    }

    #[test]
    fn test_learns_separable_clusters() {
        let (x, y) = clusters();
        let model = MlpPipeline::fit(small_config(), &x, &y).unwrap();
        let predictions = model.predict(&x).unwrap();
        assert!(accuracy(&y, &predictions) >= 0.8);

        let curve = model.classifier().loss_curve();
        assert_eq!(curve.len(), 200);
        assert!(curve[curve.len() - 1] < curve[0]);
    }

    #[test]
    fn test_probabilities_cover_all_labels() {
        let (x, y) = clusters();
        let model = MlpPipeline::fit(small_config(), &x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.dim(), (9, Label::COUNT));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_same_seed_same_weights() {
        let (x, y) = clusters();
        let a = MlpPipeline::fit(small_config(), &x, &y).unwrap();
        let b = MlpPipeline::fit(small_config(), &x, &y).unwrap();
        assert_eq!(
            a.predict_proba(&x).unwrap().unwrap(),
            b.predict_proba(&x).unwrap().unwrap()
        );
    }

    #[test]
    fn test_wrong_width_rejected() {
        let (x, y) = clusters();
        let model = MlpPipeline::fit(small_config(), &x, &y).unwrap();
        assert!(model.predict(&array![[1.0, 2.0, 3.0]]).is_err());
    }
}
