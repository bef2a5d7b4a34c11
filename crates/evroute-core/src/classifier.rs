//! Learned charge policy: a two-feature logistic classifier.
//!
//! Features are the remaining range on arrival and the driving distance to
//! the waypoint's station. Training data comes from [`crate::sim`].

use crate::models::{VehicleProfile, VehicleState, Waypoint};
use crate::policy::{ChargeDecisionPolicy, Decision};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Station distance used when a waypoint has no station.
pub const NO_STATION_SENTINEL_M: f64 = 7_777_777.0;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no training samples")]
    EmptyTrainingSet,
    #[error("model io: {0}")]
    Io(#[from] std::io::Error),
    #[error("model format: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyFeatures {
    pub remaining_range_m: f64,
    pub station_distance_m: f64,
}

impl PolicyFeatures {
    pub fn observe(state: &VehicleState, waypoint: &Waypoint) -> Self {
        Self {
            remaining_range_m: state.remaining_range_m,
            station_distance_m: waypoint
                .nearest_station
                .as_ref()
                .map(|station| station.route_distance_m)
                .unwrap_or(NO_STATION_SENTINEL_M),
        }
    }

    fn as_array(&self) -> [f64; 2] {
        [self.remaining_range_m, self.station_distance_m]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelledSample {
    pub features: PolicyFeatures,
    pub label: Decision,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Probability above which the model answers Charge.
    pub threshold: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 500,
            learning_rate: 0.5,
            threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPolicy {
    weights: [f64; 2],
    bias: f64,
    feature_mean: [f64; 2],
    feature_scale: [f64; 2],
    threshold: f64,
}

impl LearnedPolicy {
    pub fn from_parameters(
        weights: [f64; 2],
        bias: f64,
        feature_mean: [f64; 2],
        feature_scale: [f64; 2],
        threshold: f64,
    ) -> Self {
        Self {
            weights,
            bias,
            feature_mean,
            feature_scale: feature_scale.map(|s| if s.abs() > f64::EPSILON { s } else { 1.0 }),
            threshold,
        }
    }

    /// Fit on labelled samples with full-batch gradient descent on log loss.
    pub fn train(samples: &[LabelledSample], config: &TrainingConfig) -> Result<Self, ModelError> {
        if samples.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }

        let n = samples.len() as f64;
        let mut mean = [0.0; 2];
        for sample in samples {
            let x = sample.features.as_array();
            mean[0] += x[0] / n;
            mean[1] += x[1] / n;
        }
        let mut scale = [0.0; 2];
        for sample in samples {
            let x = sample.features.as_array();
            scale[0] += (x[0] - mean[0]).powi(2) / n;
            scale[1] += (x[1] - mean[1]).powi(2) / n;
        }
        let scale = scale.map(f64::sqrt);

        let mut model = Self::from_parameters([0.0; 2], 0.0, mean, scale, config.threshold);
        let inputs: Vec<([f64; 2], f64)> = samples
            .iter()
            .map(|sample| {
                let target = match sample.label {
                    Decision::Charge => 1.0,
                    Decision::Continue => 0.0,
                };
                (model.standardize(&sample.features), target)
            })
            .collect();

        for _ in 0..config.epochs {
            let mut grad_w = [0.0; 2];
            let mut grad_b = 0.0;
            for (x, target) in &inputs {
                let error = sigmoid(model.logit(x)) - target;
                grad_w[0] += error * x[0] / n;
                grad_w[1] += error * x[1] / n;
                grad_b += error / n;
            }
            model.weights[0] -= config.learning_rate * grad_w[0];
            model.weights[1] -= config.learning_rate * grad_w[1];
            model.bias -= config.learning_rate * grad_b;
        }

        Ok(model)
    }

    pub fn charge_probability(&self, features: &PolicyFeatures) -> f64 {
        sigmoid(self.logit(&self.standardize(features)))
    }

    /// Share of samples whose label the model reproduces.
    pub fn accuracy(&self, samples: &[LabelledSample]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let correct = samples
            .iter()
            .filter(|sample| self.classify(&sample.features) == sample.label)
            .count();
        correct as f64 / samples.len() as f64
    }

    pub fn classify(&self, features: &PolicyFeatures) -> Decision {
        if self.charge_probability(features) >= self.threshold {
            Decision::Charge
        } else {
            Decision::Continue
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&raw)?;
        Ok(Self::from_parameters(
            model.weights,
            model.bias,
            model.feature_mean,
            model.feature_scale,
            model.threshold,
        ))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    fn standardize(&self, features: &PolicyFeatures) -> [f64; 2] {
        let x = features.as_array();
        [
            (x[0] - self.feature_mean[0]) / self.feature_scale[0],
            (x[1] - self.feature_mean[1]) / self.feature_scale[1],
        ]
    }

    fn logit(&self, x: &[f64; 2]) -> f64 {
        self.weights[0] * x[0] + self.weights[1] * x[1] + self.bias
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl ChargeDecisionPolicy for LearnedPolicy {
    fn name(&self) -> &'static str {
        "learned"
    }

    fn decide(
        &self,
        _vehicle: &VehicleProfile,
        state: &VehicleState,
        waypoints: &[Waypoint],
        index: usize,
    ) -> Decision {
        match waypoints.get(index) {
            Some(waypoint) if waypoint.has_station() => {
                self.classify(&PolicyFeatures::observe(state, waypoint))
            }
            _ => Decision::Continue,
        }
    }
}
