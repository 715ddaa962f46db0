use crate::features::builder::FeatureSet;
use crate::features::matrix::FeatureMatrix;
use crate::predict::error::PredictError;
use crate::predict::model::ModelRegistry;
use crate::series::time_series::TimeSeries;
use crate::types::pollutant::{Pollutant, Unit};
use crate::types::reading::PollutantReading;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

/// Which strategy produced a pollutant's values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PredictionSource {
    Model { name: String, version: String },
    ForecastPassthrough,
    Unavailable,
}

/// Predicted concentrations (µg/m³) of one pollutant on the forecast grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub pollutant: Pollutant,
    pub source: PredictionSource,
    pub values: Vec<Option<f64>>,
}

impl Prediction {
    pub fn unavailable(pollutant: Pollutant, len: usize) -> Self {
        Self {
            pollutant,
            source: PredictionSource::Unavailable,
            values: vec![None; len],
        }
    }

    pub fn is_available(&self) -> bool {
        self.source != PredictionSource::Unavailable
    }

    pub fn reading(&self, i: usize) -> PollutantReading {
        PollutantReading::new(
            self.pollutant,
            Unit::UgM3,
            self.values.get(i).copied().flatten(),
        )
    }
}

/// Everything a prediction step may draw on.
#[derive(Debug, Clone, Copy)]
pub struct PredictionInput<'a> {
    pub grid: &'a [DateTime<Utc>],
    /// Features built for this pollutant, if any.
    pub features: Option<&'a FeatureSet>,
    /// Short-range air-quality forecast with canonical pollutant keys.
    pub short_range: &'a TimeSeries,
}

/// One link of the prediction chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionStep {
    Model,
    Passthrough,
}

impl PredictionStep {
    pub const CHAIN: [PredictionStep; 2] = [PredictionStep::Model, PredictionStep::Passthrough];

    fn applies(&self, predictor: &Predictor<'_>, pollutant: Pollutant, input: &PredictionInput<'_>) -> bool {
        match self {
            PredictionStep::Model => {
                predictor.use_models
                    && predictor.models.get(pollutant).is_some()
                    && input.features.is_some()
            }
            PredictionStep::Passthrough => input.short_range.has_field(pollutant.key()),
        }
    }

    fn compute(
        &self,
        predictor: &Predictor<'_>,
        pollutant: Pollutant,
        input: &PredictionInput<'_>,
    ) -> Result<Option<Prediction>, PredictError> {
        match self {
            PredictionStep::Model => {
                let (Some(model), Some(features)) = (predictor.models.get(pollutant), input.features)
                else {
                    return Ok(None);
                };
                let matrix = FeatureMatrix::build(
                    features,
                    &model.features,
                    input.grid,
                    predictor.ffill_limit,
                )?;
                let output = model.predict(&matrix);
                if output.len() != matrix.n_rows() {
                    return Err(PredictError::ModelOutputLength {
                        pollutant,
                        expected: matrix.n_rows(),
                        found: output.len(),
                    });
                }
                Ok(Some(Prediction {
                    pollutant,
                    source: PredictionSource::Model {
                        name: model.name.clone(),
                        version: model.version.clone(),
                    },
                    values: output
                        .into_iter()
                        .map(|v| Some(v).filter(|v| !v.is_nan()))
                        .collect(),
                }))
            }
            PredictionStep::Passthrough => {
                let values = input
                    .short_range
                    .reindex(input.grid)?
                    .field(pollutant.key())
                    .unwrap_or_else(|| vec![None; input.grid.len()]);
                Ok(Some(Prediction {
                    pollutant,
                    source: PredictionSource::ForecastPassthrough,
                    values,
                }))
            }
        }
    }
}

/// Runs the prediction chain per pollutant: the fitted model when one is loaded, else the
/// provider's short-range forecast as is, else nothing.
#[derive(Debug, Clone, Copy)]
pub struct Predictor<'a> {
    models: &'a ModelRegistry,
    ffill_limit: usize,
    use_models: bool,
}

impl<'a> Predictor<'a> {
    pub fn new(models: &'a ModelRegistry, ffill_limit: usize, use_models: bool) -> Self {
        Self {
            models,
            ffill_limit,
            use_models,
        }
    }

    pub fn predict(
        &self,
        pollutant: Pollutant,
        input: &PredictionInput<'_>,
    ) -> Result<Prediction, PredictError> {
        for step in PredictionStep::CHAIN {
            if !step.applies(self, pollutant, input) {
                debug!("{:?} step does not apply to {}", step, pollutant);
                continue;
            }
            if let Some(prediction) = step.compute(self, pollutant, input)? {
                if step == PredictionStep::Passthrough && self.use_models {
                    info!("No model for {}, passing through the provider forecast", pollutant);
                }
                return Ok(prediction);
            }
        }
        Ok(Prediction::unavailable(pollutant, input.grid.len()))
    }
}
