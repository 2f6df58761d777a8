//! Очистка нормализованных строк

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::preprocessing::normalization::NormalizedRow;
use crate::types::{FeatureVector, LabeledSample, TrainingDataset};

const STELLAR_TEMP: usize = 3;

/// Как были заполнены пропуски stellar_temp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StellarTempFill {
    /// Медиана по выжившим строкам
    Median(f64),
    /// Колонка пуста целиком
    Zero,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningSummary {
    pub rows_in: usize,
    pub dropped_missing: usize,
    pub dropped_outliers: usize,
    pub stellar_temp_filled: usize,
    pub stellar_temp_fill: StellarTempFill,
    pub rows_out: usize,
}

pub struct DataCleaner;

impl DataCleaner {
    pub fn clean(rows: &[NormalizedRow]) -> Result<(TrainingDataset, CleaningSummary)> {
        let rows_in = rows.len();

        // 1. Пропуски в первых трех признаках или нет валидной метки
        let complete: Vec<_> = rows
            .iter()
            .filter_map(|row| {
                let label = row.label?;
                let period = row.features[0]?;
                let duration = row.features[1]?;
                let radius = row.features[2]?;
                Some(([period, duration, radius], row.features[STELLAR_TEMP], label))
            })
            .collect();
        let dropped_missing = rows_in - complete.len();

        // 2. Физически невозможные значения
        let valid: Vec<_> = complete
            .into_iter()
            .filter(|(required, _, _)| required.iter().all(|v| v.is_finite() && *v > 0.0))
            .collect();
        let dropped_outliers = rows_in - dropped_missing - valid.len();

        if valid.is_empty() {
            return Err(PipelineError::UnusableDataset { rows_in });
        }

        // 3. stellar_temp: медиана по выжившим строкам, либо 0
        let present: Vec<f64> = valid.iter().filter_map(|(_, temp, _)| *temp).collect();
        let fill = match median(&present) {
            Some(m) => StellarTempFill::Median(m),
            None => StellarTempFill::Zero,
        };
        let fill_value = match fill {
            StellarTempFill::Median(m) => m,
            StellarTempFill::Zero => 0.0,
        };
        let stellar_temp_filled = valid.len() - present.len();

        let samples: Vec<LabeledSample> = valid
            .into_iter()
            .map(|([period, duration, radius], temp, label)| LabeledSample {
                features: FeatureVector::new(period, duration, radius, temp.unwrap_or(fill_value)),
                label,
            })
            .collect();

        let summary = CleaningSummary {
            rows_in,
            dropped_missing,
            dropped_outliers,
            stellar_temp_filled,
            stellar_temp_fill: fill,
            rows_out: samples.len(),
        };

        tracing::info!(
            "Cleaning: {} rows in, {} dropped (missing), {} dropped (outliers), {} stellar_temp filled with {:?}",
            summary.rows_in,
            summary.dropped_missing,
            summary.dropped_outliers,
            summary.stellar_temp_filled,
            summary.stellar_temp_fill
        );

        Ok((TrainingDataset::new(samples), summary))
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Label;

    fn row(features: [Option<f64>; 4], label: Option<Label>) -> NormalizedRow {
        NormalizedRow { features, label }
    }

    #[test]
    fn test_drops_missing_and_invalid_rows() {
        let rows = vec![
            row([Some(10.0), Some(2.0), Some(1.5), Some(5000.0)], Some(Label::Confirmed)),
            row([None, Some(2.0), Some(1.5), Some(5000.0)], Some(Label::Confirmed)),
            row([Some(10.0), Some(2.0), Some(1.5), Some(5000.0)], None),
            row([Some(10.0), Some(0.0), Some(1.5), Some(5000.0)], Some(Label::Candidate)),
            row([Some(-3.0), Some(2.0), Some(1.5), Some(5000.0)], Some(Label::Candidate)),
            row([Some(4.0), Some(1.0), Some(0.8), None], Some(Label::FalsePositive)),
        ];

        let (dataset, summary) = DataCleaner::clean(&rows).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(summary.dropped_missing, 2);
        assert_eq!(summary.dropped_outliers, 2);
        assert_eq!(summary.stellar_temp_filled, 1);
        // Медиана считается только по выжившим строкам
        assert_eq!(summary.stellar_temp_fill, StellarTempFill::Median(5000.0));
        assert_eq!(dataset.samples[1].features.stellar_temp, 5000.0);
    }

    #[test]
    fn test_median_ignores_dropped_rows() {
        let rows = vec![
            row([Some(1.0), Some(1.0), Some(1.0), Some(4000.0)], Some(Label::Confirmed)),
            row([Some(1.0), Some(1.0), Some(1.0), Some(6000.0)], Some(Label::Candidate)),
            row([Some(1.0), Some(1.0), Some(1.0), None], Some(Label::Candidate)),
            // выброс с экстремальной температурой не влияет на медиану
            row([Some(1.0), Some(-1.0), Some(1.0), Some(90000.0)], Some(Label::Candidate)),
        ];

        let (dataset, summary) = DataCleaner::clean(&rows).unwrap();
        assert_eq!(summary.stellar_temp_fill, StellarTempFill::Median(5000.0));
        assert_eq!(dataset.samples[2].features.stellar_temp, 5000.0);
    }

    #[test]
    fn test_entirely_missing_stellar_temp_fills_zero() {
        let rows: Vec<_> = (0..4)
            .map(|i| row([Some(1.0 + i as f64), Some(1.0), Some(1.0), None], Some(Label::Confirmed)))
            .collect();

        let (dataset, summary) = DataCleaner::clean(&rows).unwrap();
        assert_eq!(summary.stellar_temp_fill, StellarTempFill::Zero);
        assert!(dataset.samples.iter().all(|s| s.features.stellar_temp == 0.0));
    }

    #[test]
    fn test_zero_survivors_is_unusable() {
        let rows = vec![
            row([Some(0.0), Some(1.0), Some(1.0), None], Some(Label::Confirmed)),
            row([Some(1.0), Some(1.0), Some(1.0), None], None),
        ];
        assert!(matches!(
            DataCleaner::clean(&rows),
            Err(PipelineError::UnusableDataset { rows_in: 2 })
        ));
        assert!(matches!(
            DataCleaner::clean(&[]),
            Err(PipelineError::UnusableDataset { rows_in: 0 })
        ));
    }
}
