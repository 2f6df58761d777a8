//! Хранилище артефактов на диске

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::models::ModelArtifact;
use crate::types::{Algorithm, BestModelPointer};

pub const POINTER_FILE: &str = "BEST.txt";
const ARTIFACT_EXTENSION: &str = "json";

/// Каталог моделей: `<Algorithm>.json` на модель и `BEST.txt` с именем лучшей
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, algorithm: Algorithm) -> PathBuf {
        self.dir
            .join(format!("{}.{}", algorithm.as_str(), ARTIFACT_EXTENSION))
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.dir.join(POINTER_FILE)
    }

    pub fn save_artifact(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        let path = self.artifact_path(artifact.algorithm);
        let bytes = serde_json::to_vec(artifact)?;
        write_atomic(&path, &bytes)?;
        tracing::debug!("Saved {} to {}", artifact.algorithm, path.display());
        Ok(path)
    }

    /// Пишется последним, после всех артефактов
    pub fn write_pointer(&self, pointer: &BestModelPointer) -> Result<()> {
        write_atomic(&self.pointer_path(), pointer.algorithm.as_str().as_bytes())
    }

    /// Все артефакты, удаление устаревших, затем указатель.
    /// Артефакт алгоритма, не обученного в этом запуске, не переживает запуск.
    pub fn persist(&self, artifacts: &[ModelArtifact], pointer: &BestModelPointer) -> Result<Vec<PathBuf>> {
        let paths = artifacts
            .iter()
            .map(|artifact| {
                self.save_artifact(artifact)
                    .map_err(|e| persist_error(self.artifact_path(artifact.algorithm), e))
            })
            .collect::<Result<Vec<_>>>()?;

        for algorithm in Algorithm::ALL {
            if artifacts.iter().any(|a| a.algorithm == algorithm) {
                continue;
            }
            let stale = self.artifact_path(algorithm);
            if stale.is_file() {
                fs::remove_file(&stale).map_err(|e| persist_error(stale.clone(), e.into()))?;
                tracing::warn!("Removed stale {} artifact from a previous run", algorithm);
            }
        }

        self.write_pointer(pointer)
            .map_err(|e| persist_error(self.pointer_path(), e))?;
        Ok(paths)
    }

    pub fn load_artifact(&self, algorithm: Algorithm) -> Result<ModelArtifact> {
        load_artifact_file(&self.artifact_path(algorithm))
    }

    pub fn read_pointer(&self) -> Result<Algorithm> {
        let raw = fs::read_to_string(self.pointer_path())?;
        raw.parse()
    }

    /// Файлы `*.json` каталога в лексикографическом порядке имен
    pub fn available(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION)
            })
            .collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(paths)
    }
}

fn persist_error(path: PathBuf, err: PipelineError) -> PipelineError {
    PipelineError::Persist {
        path,
        reason: err.to_string(),
    }
}

pub fn load_artifact_file(path: &Path) -> Result<ModelArtifact> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// `*.tmp` рядом с целью, flush + sync, затем rename
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| PipelineError::InvalidInput(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent)?;

    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Estimator, RandomForestClassifier};
    use chrono::Utc;
    use ndarray::array;

    #[test]
    fn test_pointer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models"));
        let pointer = BestModelPointer {
            algorithm: Algorithm::Svm,
            accuracy: 0.9,
            run_at: Utc::now(),
        };

        store.write_pointer(&pointer).unwrap();
        assert_eq!(fs::read_to_string(store.pointer_path()).unwrap(), "SVM");
        assert_eq!(store.read_pointer().unwrap(), Algorithm::Svm);
        assert!(!store.dir().join("BEST.tmp").exists());
    }

    #[test]
    fn test_available_is_sorted_and_json_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["SVM.json", "NeuralNet.json", "BEST.txt", "RandomForest.json"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        let store = ModelStore::new(dir.path());
        let names: Vec<String> = store
            .available()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["NeuralNet.json", "RandomForest.json", "SVM.json"]);
    }

    fn forest_artifact() -> ModelArtifact {
        let x = array![[1.0, 2.0], [1.1, 2.1], [8.0, 9.0], [8.2, 9.1]];
        let y = array![0usize, 0, 1, 1];
        let mut forest = RandomForestClassifier::new(5, 42);
        forest.fit(&x, &y).unwrap();

        ModelArtifact {
            algorithm: Algorithm::RandomForest,
            feature_names: vec!["a".to_string(), "b".to_string()],
            accuracy: 1.0,
            supports_probabilities: true,
            trained_at: Utc::now(),
            n_train: 4,
            n_test: 0,
            estimator: Estimator::RandomForest(forest),
        }
    }

    fn best(algorithm: Algorithm) -> BestModelPointer {
        BestModelPointer {
            algorithm,
            accuracy: 1.0,
            run_at: Utc::now(),
        }
    }

    #[test]
    fn test_persist_removes_artifacts_of_models_missing_from_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        fs::write(store.artifact_path(Algorithm::Svm), "{}").unwrap();
        fs::write(store.artifact_path(Algorithm::NeuralNet), "{}").unwrap();

        let paths = store
            .persist(&[forest_artifact()], &best(Algorithm::RandomForest))
            .unwrap();

        assert_eq!(paths, vec![store.artifact_path(Algorithm::RandomForest)]);
        assert!(!store.artifact_path(Algorithm::Svm).exists());
        assert!(!store.artifact_path(Algorithm::NeuralNet).exists());
        assert_eq!(store.available().unwrap(), paths);
        assert_eq!(store.read_pointer().unwrap(), Algorithm::RandomForest);
        assert_eq!(store.load_artifact(Algorithm::RandomForest).unwrap().n_train, 4);
    }

    #[test]
    fn test_persist_failure_names_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "").unwrap();
        let store = ModelStore::new(blocker.join("models"));

        let err = store
            .persist(&[forest_artifact()], &best(Algorithm::RandomForest))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Persist { .. }));
        assert!(err.to_string().starts_with("persist "));
        assert!(err.to_string().contains("RandomForest.json"));
    }

    #[test]
    fn test_missing_dir_has_nothing_available() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("absent"));
        assert!(store.available().unwrap().is_empty());
        assert!(store.read_pointer().is_err());
    }
}
