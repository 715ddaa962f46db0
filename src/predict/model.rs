//! Loading and invoking the fitted regression models.
//!
//! A model is opaque to the pipeline: it receives a [`FeatureMatrix`] whose columns are in
//! the order of the bundle's feature list and returns one value per row. Bundles are
//! stored as bincode files named `model_<pollutant key>.bin`.

use crate::features::matrix::FeatureMatrix;
use crate::predict::error::ModelError;
use crate::types::pollutant::Pollutant;
use crate::utils::ensure_dir_exists;
use bincode::config::{Configuration, Fixint, LittleEndian};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();

/// Anything that maps a feature matrix to one prediction per row.
pub trait Regressor: Send + Sync {
    fn predict(&self, features: &FeatureMatrix) -> Vec<f64>;
}

/// Ordinary linear model. Undefined (NaN) inputs contribute nothing to the sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl Regressor for LinearRegressor {
    fn predict(&self, features: &FeatureMatrix) -> Vec<f64> {
        features
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.coefficients)
                    .filter(|(x, _)| !x.is_nan())
                    .map(|(x, c)| x * c)
                    .sum::<f64>()
                    + self.intercept
            })
            .collect()
    }
}

/// Serializable estimators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Estimator {
    Linear(LinearRegressor),
}

impl Estimator {
    fn into_regressor(self) -> Arc<dyn Regressor> {
        match self {
            Estimator::Linear(model) => Arc::new(model),
        }
    }

    fn input_len(&self) -> usize {
        match self {
            Estimator::Linear(model) => model.coefficients.len(),
        }
    }
}

/// A named, versioned model artifact together with its ordered feature list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub name: String,
    pub version: String,
    pub features: Vec<String>,
    pub model: Estimator,
}

impl ModelBundle {
    pub fn file_name(pollutant: Pollutant) -> String {
        format!("model_{}.bin", pollutant.key())
    }

    fn validate(&self) -> Result<(), ModelError> {
        let found = self.model.input_len();
        if found != self.features.len() {
            return Err(ModelError::FeatureCountMismatch {
                name: self.name.clone(),
                expected: self.features.len(),
                found,
            });
        }
        Ok(())
    }

    /// Reads and decodes a bundle. Blocking; call from `spawn_blocking`.
    pub fn read(path: &Path) -> Result<ModelBundle, ModelError> {
        let bytes = std::fs::read(path).map_err(|e| ModelError::Read(path.to_path_buf(), e))?;
        let (bundle, _) = bincode::serde::decode_from_slice::<ModelBundle, _>(&bytes, BINCODE_CONFIG)
            .map_err(|e| ModelError::Decode(path.to_path_buf(), Box::from(e)))?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Encodes and writes the bundle to `path`.
    pub async fn save(&self, path: &Path) -> Result<(), ModelError> {
        let bundle = self.clone();
        let bytes = tokio::task::spawn_blocking(move || {
            bincode::serde::encode_to_vec(bundle, BINCODE_CONFIG)
                .map_err(|e| ModelError::Encode(Box::new(e)))
        })
        .await??;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir_exists(parent)
                .await
                .map_err(|e| ModelError::Write(parent.to_path_buf(), e))?;
        }
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| ModelError::Write(path.to_path_buf(), e))?;
        info!("Wrote model '{}' ({} bytes) to {}", self.name, bytes.len(), path.display());
        Ok(())
    }
}

/// A loaded model ready for inference.
#[derive(Clone)]
pub struct ModelHandle {
    pub name: String,
    pub version: String,
    pub features: Vec<String>,
    regressor: Arc<dyn Regressor>,
}

impl ModelHandle {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        features: Vec<String>,
        regressor: Arc<dyn Regressor>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            features,
            regressor,
        }
    }

    pub fn predict(&self, features: &FeatureMatrix) -> Vec<f64> {
        self.regressor.predict(features)
    }
}

impl From<ModelBundle> for ModelHandle {
    fn from(bundle: ModelBundle) -> Self {
        ModelHandle {
            name: bundle.name,
            version: bundle.version,
            features: bundle.features,
            regressor: bundle.model.into_regressor(),
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("features", &self.features.len())
            .finish()
    }
}

/// The models available to a client, at most one per pollutant. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<Pollutant, ModelHandle>,
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, pollutant: Pollutant, handle: ModelHandle) -> Self {
        self.models.insert(pollutant, handle);
        self
    }

    pub fn get(&self, pollutant: Pollutant) -> Option<&ModelHandle> {
        self.models.get(&pollutant)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Loads every `model_<key>.bin` found in `dir`.
    ///
    /// A missing file means no model for that pollutant. An unreadable or corrupt file is
    /// logged and skipped so that the pollutant falls back to the forecast passthrough.
    pub async fn load_dir(dir: &Path) -> Result<Self, ModelError> {
        let dir: PathBuf = dir.to_path_buf();
        let models = tokio::task::spawn_blocking(move || {
            let mut models = HashMap::new();
            for pollutant in Pollutant::ALL {
                let path = dir.join(ModelBundle::file_name(pollutant));
                if !path.exists() {
                    info!("No model for {} at {}", pollutant, path.display());
                    continue;
                }
                match ModelBundle::read(&path) {
                    Ok(bundle) => {
                        info!(
                            "Loaded model '{}' v{} for {} ({} features)",
                            bundle.name,
                            bundle.version,
                            pollutant,
                            bundle.features.len()
                        );
                        models.insert(pollutant, ModelHandle::from(bundle));
                    }
                    Err(e) => warn!("Skipping model for {}: {}", pollutant, e),
                }
            }
            models
        })
        .await?;
        Ok(Self { models })
    }
}
