//! Приведение сырых колонок KOI к внутренней схеме признаков и меток

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Label, N_FEATURES};

/// Сырая колонка -> внутренний признак, в порядке FEATURE_NAMES
pub const COLUMN_MAPPING: [(&str, &str); N_FEATURES] = [
    ("koi_period", "orbital_period"),
    ("koi_duration", "transit_duration"),
    ("koi_prad", "planet_radius"),
    ("koi_steff", "stellar_temp"),
];

pub const PRIMARY_LABEL_COLUMN: &str = "koi_pdisposition";
pub const SECONDARY_LABEL_COLUMN: &str = "koi_disposition";

/// Какая колонка дала метку строки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelSource {
    /// koi_pdisposition присутствует и не пуст
    Primary,
    /// koi_pdisposition пуст или отсутствует, взят koi_disposition
    Secondary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub features: [Option<f64>; N_FEATURES],
    pub label: Option<Label>,
}

/// Маппинг сырой диспозиции; сравнение без учета регистра
pub fn map_disposition(raw: &str) -> Option<Label> {
    match raw.trim().to_uppercase().as_str() {
        "CONFIRMED" => Some(Label::Confirmed),
        "CANDIDATE" => Some(Label::Candidate),
        "FALSE POSITIVE" => Some(Label::FalsePositive),
        _ => None,
    }
}

/// Сначала основная колонка, если значение непустое, иначе запасная
pub fn resolve_label(primary: Option<&str>, secondary: Option<&str>) -> (Option<Label>, LabelSource) {
    match primary.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => (map_disposition(value), LabelSource::Primary),
        None => (secondary.and_then(map_disposition), LabelSource::Secondary),
    }
}

pub struct FeatureNormalizer;

impl FeatureNormalizer {
    /// Чистая функция: таблица -> строки с четырьмя признаками и меткой
    pub fn normalize(df: &DataFrame) -> Result<Vec<NormalizedRow>> {
        let n_rows = df.height();

        let mut columns = Vec::with_capacity(N_FEATURES);
        for (source, target) in COLUMN_MAPPING {
            let values = numeric_column(df, source)?;
            if values.iter().all(Option::is_none) {
                tracing::debug!("Column {} -> {} has no values", source, target);
            }
            columns.push(values);
        }

        let primary = text_column(df, PRIMARY_LABEL_COLUMN)?;
        let secondary = text_column(df, SECONDARY_LABEL_COLUMN)?;

        let mut from_primary = 0usize;
        let mut rows = Vec::with_capacity(n_rows);
        for i in 0..n_rows {
            let mut features = [None; N_FEATURES];
            for (j, column) in columns.iter().enumerate() {
                features[j] = column[i];
            }

            let (label, source) = resolve_label(
                primary.as_ref().and_then(|c| c[i].as_deref()),
                secondary.as_ref().and_then(|c| c[i].as_deref()),
            );
            if source == LabelSource::Primary {
                from_primary += 1;
            }

            rows.push(NormalizedRow { features, label });
        }

        tracing::debug!(
            "Normalized {} rows ({} labels from {}, {} from {})",
            n_rows,
            from_primary,
            PRIMARY_LABEL_COLUMN,
            n_rows - from_primary,
            SECONDARY_LABEL_COLUMN
        );

        Ok(rows)
    }
}

/// Числовая колонка; нечисловые и нефинитные значения считаются пропусками
fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = match df.column(name) {
        Ok(column) => column,
        Err(_) => return Ok(vec![None; df.height()]),
    };

    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    let values = series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();

    Ok(values)
}

fn text_column(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<String>>>> {
    let column = match df.column(name) {
        Ok(column) => column,
        Err(_) => return Ok(None),
    };

    let series = column.as_materialized_series().cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();

    Ok(Some(values))
}
