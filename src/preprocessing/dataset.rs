//! Чтение исходной таблицы KOI

use std::fs::File;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::error::{PipelineError, Result};

/// Откуда взят набор данных: основной файл или запасной образец
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    Primary(PathBuf),
    Fallback(PathBuf),
}

impl DatasetSource {
    pub fn path(&self) -> &Path {
        match self {
            DatasetSource::Primary(p) | DatasetSource::Fallback(p) => p,
        }
    }
}

/// Первый существующий файл: сначала основной, затем запасной
pub fn resolve_source(primary: Option<&Path>, fallback: Option<&Path>) -> Result<DatasetSource> {
    if let Some(path) = primary {
        if path.is_file() {
            return Ok(DatasetSource::Primary(path.to_path_buf()));
        }
        tracing::warn!("Primary dataset {} not found", path.display());
    }

    if let Some(path) = fallback {
        if path.is_file() {
            tracing::warn!("Training on fallback sample {}", path.display());
            return Ok(DatasetSource::Fallback(path.to_path_buf()));
        }
    }

    let tried: Vec<PathBuf> = primary
        .into_iter()
        .chain(fallback)
        .map(Path::to_path_buf)
        .collect();
    Err(PipelineError::DatasetUnavailable(tried))
}

/// CSV с заголовком; строки, начинающиеся с `#`, считаются метаданными
pub fn load_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .map_err(|e| PipelineError::Data(format!("{}: {}", path.display(), e)))?;

    let parse_opts = CsvParseOptions::default().with_comment_prefix(Some("#"));

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_parse_options(parse_opts)
        .into_reader_with_file_handle(file)
        .finish()
        .map_err(|e| PipelineError::Data(format!("{}: {}", path.display(), e)))?;

    tracing::info!(
        "Loaded {} rows, {} columns from {}",
        df.height(),
        df.width(),
        path.display()
    );

    Ok(df)
}
