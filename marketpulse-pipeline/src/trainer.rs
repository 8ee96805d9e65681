//! Training orchestration: processed sentiment plus price history in,
//! model artifact out.
//!
//! A training run never partially publishes. The artifact on disk is only
//! replaced after a full fit succeeds; any failure leaves the previous
//! model serving predictions.

use crate::config::PipelineConfig;
use crate::features::{build_training_rows, LabeledRow};
use crate::model::{DirectionModel, ModelError};
use chrono::NaiveDate;
use marketpulse_core::prices::{recent_history, PriceBar, PriceProvider};
use marketpulse_core::store::{SentimentStore, StoreError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

const SYNTHETIC_DAYS: usize = 120;
const SYNTHETIC_SEED: u64 = 7;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("no price history for any symbol")]
    NoPriceHistory,
}

/// What a completed training run produced.
#[derive(Debug)]
pub struct TrainReport {
    pub rows: usize,
    pub holdout_accuracy: f64,
    /// True when the run fell back to generated data.
    pub synthetic: bool,
    pub model_path: PathBuf,
}

/// Mean sentiment per (date, symbol) across every configured source.
fn aggregate_sentiment(
    store: &SentimentStore,
    sources: &[String],
) -> Result<HashMap<(NaiveDate, String), f64>, StoreError> {
    let mut sums: HashMap<(NaiveDate, String), (f64, usize)> = HashMap::new();
    for source in sources {
        for rec in store.read_all(source)? {
            let entry = sums
                .entry((rec.partition_date, rec.record.symbol.clone()))
                .or_insert((0.0, 0));
            entry.0 += rec.sentiment;
            entry.1 += 1;
        }
    }
    Ok(sums
        .into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect())
}

/// Random-walk price series plus weakly-correlated sentiment, used when the
/// store has not yet accumulated enough real rows for a fit.
fn synthetic_rows(symbols: &[String]) -> Vec<LabeledRow> {
    let mut rng = StdRng::seed_from_u64(SYNTHETIC_SEED);
    let mut bars_by_symbol: HashMap<String, Vec<PriceBar>> = HashMap::new();
    let mut sentiment: HashMap<(NaiveDate, String), f64> = HashMap::new();

    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    for symbol in symbols {
        let mut close = rng.gen_range(100.0..2000.0);
        let mut bars = Vec::with_capacity(SYNTHETIC_DAYS);
        for day in 0..SYNTHETIC_DAYS {
            let date = start + chrono::Days::new(day as u64);
            let drift: f64 = rng.gen_range(-0.02..0.02);
            let open = close;
            close *= 1.0 + drift;
            bars.push(PriceBar {
                symbol: symbol.clone(),
                date,
                open,
                high: open.max(close) * 1.01,
                low: open.min(close) * 0.99,
                close,
                volume: rng.gen_range(10_000..1_000_000),
            });
            // Sentiment leans the way the next day will move, with noise.
            let noise: f64 = rng.gen_range(-0.3..0.3);
            sentiment.insert((date, symbol.clone()), (drift * 20.0 + noise).clamp(-1.0, 1.0));
        }
        bars_by_symbol.insert(symbol.clone(), bars);
    }

    build_training_rows(&bars_by_symbol, &sentiment)
}

/// Run one training cycle and atomically replace the model artifact.
///
/// Symbols whose price fetch fails are skipped with a warning; the run only
/// fails outright when no symbol yields history at all or the fit itself
/// fails.
pub fn run_training(
    config: &PipelineConfig,
    provider: &dyn PriceProvider,
) -> Result<TrainReport, TrainError> {
    let store = SentimentStore::new(config.processed_root());
    let sentiment = aggregate_sentiment(&store, &config.pipeline.sources)?;
    log::info!("aggregated sentiment for {} (date, symbol) pairs", sentiment.len());

    let mut bars_by_symbol: HashMap<String, Vec<PriceBar>> = HashMap::new();
    for symbol in &config.pipeline.symbols {
        match recent_history(provider, &config.ticker(symbol), config.pipeline.training_history_days) {
            Ok(bars) if !bars.is_empty() => {
                bars_by_symbol.insert(symbol.clone(), bars);
            }
            Ok(_) => log::warn!("no price history for {symbol}, skipping"),
            Err(e) => log::warn!("price fetch failed for {symbol}: {e}, skipping"),
        }
    }
    if bars_by_symbol.is_empty() {
        return Err(TrainError::NoPriceHistory);
    }

    let mut rows = build_training_rows(&bars_by_symbol, &sentiment);
    let mut synthetic = false;
    if rows.len() < config.pipeline.min_training_rows {
        log::warn!(
            "only {} real training rows (need {}), falling back to synthetic data",
            rows.len(),
            config.pipeline.min_training_rows
        );
        rows = synthetic_rows(&config.pipeline.symbols);
        synthetic = true;
    }

    let model = DirectionModel::fit(&rows)?;
    let model_path = config.model_path();
    model.save(&model_path)?;
    log::info!(
        "trained on {} rows (holdout accuracy {:.3}), saved to {}",
        rows.len(),
        model.holdout_accuracy,
        model_path.display()
    );

    Ok(TrainReport {
        rows: rows.len(),
        holdout_accuracy: model.holdout_accuracy,
        synthetic,
        model_path,
    })
}
