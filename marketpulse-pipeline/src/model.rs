//! Direction model: logistic regression over standardized features.
//!
//! The artifact is a small JSON document holding the learned weights, the
//! standardization parameters, and provenance (training timestamp, holdout
//! accuracy, dataset fingerprint). Saves go through a temp file and rename
//! so readers only ever see a complete artifact.

use crate::features::{FeatureVector, LabeledRow, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SCHEMA_VERSION: u32 = 1;
const LEARNING_RATE: f64 = 0.1;
const EPOCHS: usize = 400;
const HOLDOUT_FRACTION: f64 = 0.2;
const MIN_FIT_ROWS: usize = 20;
const SHUFFLE_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("not enough training rows: {got} (need at least {need})")]
    InsufficientData { got: usize, need: usize },

    #[error("model io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unsupported model schema version {0}")]
    SchemaVersion(u32),
}

/// Trained logistic-regression artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionModel {
    pub schema_version: u32,
    pub weights: [f64; FEATURE_COUNT],
    pub bias: f64,
    /// Per-feature standardization offsets from the training set.
    pub means: [f64; FEATURE_COUNT],
    /// Per-feature standardization scales; zero-variance features keep 1.0.
    pub stds: [f64; FEATURE_COUNT],
    pub trained_at: String,
    pub holdout_accuracy: f64,
    pub training_rows: usize,
    /// blake3 of the training matrix, for artifact provenance.
    pub dataset_hash: String,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn dataset_fingerprint(rows: &[LabeledRow]) -> String {
    let mut hasher = blake3::Hasher::new();
    for row in rows {
        for v in row.features.as_array() {
            hasher.update(&v.to_le_bytes());
        }
        hasher.update(&[row.label as u8]);
    }
    hasher.finalize().to_hex().to_string()
}

impl DirectionModel {
    /// Fit on labeled rows. Shuffles deterministically, holds out the tail
    /// fraction for the reported accuracy, trains by full-batch gradient
    /// descent on standardized features.
    pub fn fit(rows: &[LabeledRow]) -> Result<Self, ModelError> {
        if rows.len() < MIN_FIT_ROWS {
            return Err(ModelError::InsufficientData {
                got: rows.len(),
                need: MIN_FIT_ROWS,
            });
        }

        let dataset_hash = dataset_fingerprint(rows);

        let mut shuffled: Vec<&LabeledRow> = rows.iter().collect();
        let mut rng = StdRng::seed_from_u64(SHUFFLE_SEED);
        shuffled.shuffle(&mut rng);

        let holdout = ((shuffled.len() as f64 * HOLDOUT_FRACTION) as usize).max(1);
        let (train, held) = shuffled.split_at(shuffled.len() - holdout);

        // Standardization parameters come from the training split only.
        let mut means = [0.0; FEATURE_COUNT];
        let mut stds = [0.0; FEATURE_COUNT];
        for row in train {
            let f = row.features.as_array();
            for j in 0..FEATURE_COUNT {
                means[j] += f[j];
            }
        }
        for m in &mut means {
            *m /= train.len() as f64;
        }
        for row in train {
            let f = row.features.as_array();
            for j in 0..FEATURE_COUNT {
                stds[j] += (f[j] - means[j]).powi(2);
            }
        }
        for s in &mut stds {
            *s = (*s / train.len() as f64).sqrt();
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        let standardize = |f: [f64; FEATURE_COUNT]| -> [f64; FEATURE_COUNT] {
            let mut z = [0.0; FEATURE_COUNT];
            for j in 0..FEATURE_COUNT {
                z[j] = (f[j] - means[j]) / stds[j];
            }
            z
        };

        let mut weights = [0.0; FEATURE_COUNT];
        let mut bias = 0.0;
        let n = train.len() as f64;

        for _ in 0..EPOCHS {
            let mut grad_w = [0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;
            for row in train {
                let x = standardize(row.features.as_array());
                let z = weights.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f64>() + bias;
                let err = sigmoid(z) - if row.label { 1.0 } else { 0.0 };
                for j in 0..FEATURE_COUNT {
                    grad_w[j] += err * x[j];
                }
                grad_b += err;
            }
            for j in 0..FEATURE_COUNT {
                weights[j] -= LEARNING_RATE * grad_w[j] / n;
            }
            bias -= LEARNING_RATE * grad_b / n;
        }

        let model = Self {
            schema_version: SCHEMA_VERSION,
            weights,
            bias,
            means,
            stds,
            trained_at: chrono::Utc::now().to_rfc3339(),
            holdout_accuracy: 0.0,
            training_rows: rows.len(),
            dataset_hash,
        };

        let correct = held
            .iter()
            .filter(|row| (model.predict_up_probability(&row.features) >= 0.5) == row.label)
            .count();
        let holdout_accuracy = correct as f64 / held.len() as f64;

        Ok(Self {
            holdout_accuracy,
            ..model
        })
    }

    /// Probability the next close is above the current one.
    pub fn predict_up_probability(&self, features: &FeatureVector) -> f64 {
        let f = features.as_array();
        let mut z = self.bias;
        for j in 0..FEATURE_COUNT {
            z += self.weights[j] * (f[j] - self.means[j]) / self.stds[j];
        }
        sigmoid(z)
    }

    /// Write the artifact atomically: temp file in the same directory, then
    /// rename over the destination.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ModelError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, json).map_err(|e| ModelError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, path).map_err(|e| ModelError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|e| ModelError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let model: Self = serde_json::from_str(&content)?;
        if model.schema_version != SCHEMA_VERSION {
            return Err(ModelError::SchemaVersion(model.schema_version));
        }
        Ok(model)
    }
}
