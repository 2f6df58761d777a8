//! Конфигурация конвейера

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const MODELS_DIR_ENV: &str = "KOI_MODELS_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_svm_c")]
    pub svm_c: f64,
    #[serde(default = "default_svm_max_iter")]
    pub svm_max_iter: usize,
    #[serde(default = "default_mlp_hidden_layers")]
    pub mlp_hidden_layers: Vec<usize>,
    #[serde(default = "default_mlp_max_epochs")]
    pub mlp_max_epochs: usize,
    #[serde(default = "default_mlp_learning_rate")]
    pub mlp_learning_rate: f64,
    #[serde(default = "default_mlp_batch_size")]
    pub mlp_batch_size: usize,
    #[serde(default = "default_mlp_momentum")]
    pub mlp_momentum: f64,
    #[serde(default = "default_mlp_alpha")]
    pub mlp_alpha: f64,
}

fn default_models_dir() -> PathBuf { PathBuf::from("trained_models") }
fn default_random_seed() -> u64 { 42 }
fn default_n_estimators() -> usize { 300 }
fn default_svm_c() -> f64 { 3.0 }
fn default_svm_max_iter() -> usize { 300 }
fn default_mlp_hidden_layers() -> Vec<usize> { vec![64, 32] }
fn default_mlp_max_epochs() -> usize { 300 }
fn default_mlp_learning_rate() -> f64 { 0.01 }
fn default_mlp_batch_size() -> usize { 32 }
fn default_mlp_momentum() -> f64 { 0.9 }
fn default_mlp_alpha() -> f64 { 1e-4 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            random_seed: default_random_seed(),
            n_estimators: default_n_estimators(),
            svm_c: default_svm_c(),
            svm_max_iter: default_svm_max_iter(),
            mlp_hidden_layers: default_mlp_hidden_layers(),
            mlp_max_epochs: default_mlp_max_epochs(),
            mlp_learning_rate: default_mlp_learning_rate(),
            mlp_batch_size: default_mlp_batch_size(),
            mlp_momentum: default_mlp_momentum(),
            mlp_alpha: default_mlp_alpha(),
        }
    }
}

impl PipelineConfig {
    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    /// Загрузка из JSON; отсутствующие ключи берутся по умолчанию
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Файл (если задан) + переопределение каталога моделей из окружения
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        if let Ok(dir) = std::env::var(MODELS_DIR_ENV) {
            if !dir.trim().is_empty() {
                config.models_dir = PathBuf::from(dir);
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PipelineError::Config("n_estimators must be positive".to_string()));
        }
        if !(self.svm_c > 0.0) {
            return Err(PipelineError::Config("svm_c must be positive".to_string()));
        }
        if self.mlp_hidden_layers.is_empty() || self.mlp_hidden_layers.contains(&0) {
            return Err(PipelineError::Config(
                "mlp_hidden_layers must be non-empty with positive sizes".to_string(),
            ));
        }
        if self.mlp_batch_size == 0 {
            return Err(PipelineError::Config("mlp_batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.random_seed, 42);
        assert_eq!(config.n_estimators, 300);
        assert_eq!(config.mlp_hidden_layers, vec![64, 32]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "n_estimators": 50, "models_dir": "out" }}"#).unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.n_estimators, 50);
        assert_eq!(config.models_dir, PathBuf::from("out"));
        assert_eq!(config.svm_c, 3.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "mlp_hidden_layers": [] }}"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_file(file.path()),
            Err(PipelineError::Config(_))
        ));
    }
}
