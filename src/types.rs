/// Типы данных конвейера KOI

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Порядок признаков фиксирован: по нему строятся матрицы и вектора вероятностей
pub const FEATURE_NAMES: [&str; 4] = [
    "orbital_period",
    "transit_duration",
    "planet_radius",
    "stellar_temp",
];

pub const N_FEATURES: usize = FEATURE_NAMES.len();

pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Каноническая метка диспозиции. Порядок вариантов = порядок классов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Label {
    Confirmed,
    Candidate,
    #[serde(rename = "False Positive")]
    FalsePositive,
}

impl Label {
    pub const ALL: [Label; 3] = [Label::Confirmed, Label::Candidate, Label::FalsePositive];
    pub const COUNT: usize = 3;

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Confirmed => "Confirmed",
            Label::Candidate => "Candidate",
            Label::FalsePositive => "False Positive",
        }
    }

    /// Индекс класса в каноническом порядке
    pub fn index(&self) -> usize {
        match self {
            Label::Confirmed => 0,
            Label::Candidate => 1,
            Label::FalsePositive => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Label> {
        Label::ALL.get(index).copied()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Вектор из четырех признаков, неизменяемый после построения
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub orbital_period: f64,
    pub transit_duration: f64,
    pub planet_radius: f64,
    pub stellar_temp: f64,
}

impl FeatureVector {
    pub fn new(orbital_period: f64, transit_duration: f64, planet_radius: f64, stellar_temp: f64) -> Self {
        Self {
            orbital_period,
            transit_duration,
            planet_radius,
            stellar_temp,
        }
    }

    /// Строит вектор из словаря имя -> значение. Отсутствующий признак не подставляется.
    pub fn from_map(values: &HashMap<String, f64>) -> Result<Self> {
        let get = |name: &str| -> Result<f64> {
            values.get(name).copied().ok_or_else(|| PipelineError::SchemaMismatch {
                missing: name.to_string(),
            })
        };

        Ok(Self {
            orbital_period: get("orbital_period")?,
            transit_duration: get("transit_duration")?,
            planet_radius: get("planet_radius")?,
            stellar_temp: get("stellar_temp")?,
        })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "orbital_period" => Some(self.orbital_period),
            "transit_duration" => Some(self.transit_duration),
            "planet_radius" => Some(self.planet_radius),
            "stellar_temp" => Some(self.stellar_temp),
            _ => None,
        }
    }

    /// Значения в каноническом порядке FEATURE_NAMES
    pub fn to_array(&self) -> [f64; N_FEATURES] {
        [
            self.orbital_period,
            self.transit_duration,
            self.planet_radius,
            self.stellar_temp,
        ]
    }

    /// Значения в порядке, записанном в артефакте модели
    pub fn ordered(&self, feature_names: &[String]) -> Result<Vec<f64>> {
        feature_names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| PipelineError::SchemaMismatch {
                    missing: name.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub features: FeatureVector,
    pub label: Label,
}

/// Очищенный набор: у каждой строки есть все признаки и валидная метка
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub samples: Vec<LabeledSample>,
}

impl TrainingDataset {
    pub fn new(samples: Vec<LabeledSample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.samples.iter().map(|s| s.label).collect()
    }

    pub fn label_counts(&self) -> BTreeMap<Label, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.label).or_insert(0) += 1;
        }
        counts
    }
}

/// Идентичность алгоритма; порядок ALL задает приоритет при равной точности
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    RandomForest,
    #[serde(rename = "SVM")]
    Svm,
    NeuralNet,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::RandomForest, Algorithm::Svm, Algorithm::NeuralNet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RandomForest => "RandomForest",
            Algorithm::Svm => "SVM",
            Algorithm::NeuralNet => "NeuralNet",
        }
    }

    /// Меньше = выше приоритет
    pub fn priority(&self) -> usize {
        match self {
            Algorithm::RandomForest => 0,
            Algorithm::Svm => 1,
            Algorithm::NeuralNet => 2,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "RandomForest" => Ok(Algorithm::RandomForest),
            "SVM" => Ok(Algorithm::Svm),
            "NeuralNet" => Ok(Algorithm::NeuralNet),
            other => Err(PipelineError::InvalidInput(format!("unknown algorithm `{}`", other))),
        }
    }
}

/// Лучшая модель последнего успешного запуска обучения
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestModelPointer {
    pub algorithm: Algorithm,
    pub accuracy: f64,
    pub run_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelScore {
    pub algorithm: Algorithm,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFailure {
    pub algorithm: Algorithm,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    pub confidence: f64,
    /// None, если модель не умеет калиброванные вероятности
    pub probabilities: Option<BTreeMap<Label, f64>>,
    pub algorithm: Algorithm,
}
