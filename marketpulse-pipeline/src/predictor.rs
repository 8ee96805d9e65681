//! Prediction cycle: per-symbol direction calls published as one JSON
//! artifact.
//!
//! The artifact is replaced wholesale on every cycle; a symbol whose price
//! fetch or feature construction fails is omitted from that cycle rather
//! than carried over stale. An empty cycle still publishes an empty list so
//! consumers can tell "ran with nothing to say" from "never ran".

use crate::config::PipelineConfig;
use crate::features::latest_feature_vector;
use crate::model::{DirectionModel, ModelError};
use marketpulse_core::store::SentimentStore;
use marketpulse_core::prices::{recent_history, PriceProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("predictions io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("predictions serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

/// One symbol's published call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub symbol: String,
    pub current_price: f64,
    pub direction: Direction,
    /// Probability assigned to the published direction, in [0.5, 1.0].
    pub confidence: f64,
    /// Aggregated recent sentiment that fed the feature vector.
    pub sentiment: f64,
    pub generated_at: String,
}

/// What one prediction cycle produced.
#[derive(Debug)]
pub struct PredictReport {
    pub predictions: usize,
    pub skipped: usize,
    pub artifact_path: PathBuf,
}

/// Run one prediction cycle against the current model artifact.
///
/// A missing or unreadable model aborts the cycle before anything is
/// published; the previous artifact stays in place.
pub fn run_prediction(
    config: &PipelineConfig,
    provider: &dyn PriceProvider,
) -> Result<PredictReport, PredictError> {
    let model = DirectionModel::load(&config.model_path())?;
    let store = SentimentStore::new(config.processed_root());
    let generated_at = chrono::Utc::now().to_rfc3339();

    let mut predictions = Vec::new();
    let mut skipped = 0usize;

    for symbol in &config.pipeline.symbols {
        let bars = match recent_history(
            provider,
            &config.ticker(symbol),
            config.pipeline.prediction_history_days,
        ) {
            Ok(bars) => bars,
            Err(e) => {
                log::warn!("price fetch failed for {symbol}: {e}, omitting from this cycle");
                skipped += 1;
                continue;
            }
        };

        let sentiment = store.read_recent_mean(
            &config.pipeline.sentiment_source,
            symbol,
            config.pipeline.sentiment_partitions,
        );

        let Some(features) = latest_feature_vector(&bars, sentiment) else {
            log::warn!("not enough history for {symbol}, omitting from this cycle");
            skipped += 1;
            continue;
        };

        let p_up = model.predict_up_probability(&features);
        let (direction, confidence) = if p_up >= 0.5 {
            (Direction::Up, p_up)
        } else {
            (Direction::Down, 1.0 - p_up)
        };

        log::info!(
            "{symbol}: {direction} (confidence {confidence:.3}, sentiment {sentiment:.3})"
        );
        predictions.push(PredictionRecord {
            symbol: symbol.clone(),
            current_price: features.close,
            direction,
            confidence,
            sentiment,
            generated_at: generated_at.clone(),
        });
    }

    let artifact_path = config.predictions_path();
    write_predictions(&artifact_path, &predictions)?;
    log::info!(
        "published {} predictions ({} skipped) to {}",
        predictions.len(),
        skipped,
        artifact_path.display()
    );

    Ok(PredictReport {
        predictions: predictions.len(),
        skipped,
        artifact_path,
    })
}

/// Atomically replace the predictions artifact.
pub fn write_predictions(path: &Path, predictions: &[PredictionRecord]) -> Result<(), PredictError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PredictError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(predictions)?;
    std::fs::write(&tmp, json).map_err(|e| PredictError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| PredictError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn read_predictions(path: &Path) -> Result<Vec<PredictionRecord>, PredictError> {
    let content = std::fs::read_to_string(path).map_err(|e| PredictError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}
