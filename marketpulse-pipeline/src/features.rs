//! Feature construction: merging price history with aggregated sentiment.
//!
//! The pipeline owns the merge and freshness contract; the indicator set
//! itself is deliberately small (trailing moving averages and short-window
//! volatility of daily returns). Missing sentiment for a (date, symbol)
//! pair fills as the neutral 0.0; absence of news never drops a row.

use chrono::NaiveDate;
use marketpulse_core::prices::PriceBar;
use std::collections::HashMap;

/// Number of model features.
pub const FEATURE_COUNT: usize = 5;

const MA_SHORT: usize = 5;
const MA_LONG: usize = 10;
const VOLATILITY_WINDOW: usize = 5;

/// One inference input: aggregated sentiment plus price-derived indicators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub sentiment: f64,
    pub close: f64,
    pub ma_short: f64,
    pub ma_long: f64,
    pub volatility: f64,
}

impl FeatureVector {
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.sentiment,
            self.close,
            self.ma_short,
            self.ma_long,
            self.volatility,
        ]
    }
}

/// One labeled training example: features as of `date`, label from the
/// following bar's close.
#[derive(Debug, Clone)]
pub struct LabeledRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub features: FeatureVector,
    /// True when the next close is above this close.
    pub label: bool,
}

/// Trailing mean over `window` values; `None` until the window fills.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i + 1 < window {
                None
            } else {
                let slice = &values[i + 1 - window..=i];
                Some(slice.iter().sum::<f64>() / window as f64)
            }
        })
        .collect()
}

/// Sample standard deviation of daily returns over a trailing window.
///
/// Returns `None` until `window` returns are available (the first close has
/// no return).
pub fn rolling_volatility(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut returns: Vec<Option<f64>> = vec![None];
    for i in 1..closes.len() {
        returns.push(Some(closes[i] / closes[i - 1] - 1.0));
    }

    returns
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i < window {
                return None;
            }
            let slice: Vec<f64> = returns[i + 1 - window..=i]
                .iter()
                .copied()
                .collect::<Option<Vec<f64>>>()?;
            Some(sample_std(&slice))
        })
        .collect()
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Indicator columns for a date-sorted bar series.
fn indicator_columns(bars: &[PriceBar]) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    (
        rolling_mean(&closes, MA_SHORT),
        rolling_mean(&closes, MA_LONG),
        rolling_volatility(&closes, VOLATILITY_WINDOW),
    )
}

/// Build labeled training rows by merging per-symbol price history with
/// per-(date, symbol) mean sentiment.
///
/// Rows with an incomplete indicator window or no following bar are
/// dropped; rows with no sentiment entry get the neutral 0.0.
pub fn build_training_rows(
    bars_by_symbol: &HashMap<String, Vec<PriceBar>>,
    sentiment: &HashMap<(NaiveDate, String), f64>,
) -> Vec<LabeledRow> {
    let mut rows = Vec::new();

    for (symbol, bars) in bars_by_symbol {
        let mut bars = bars.clone();
        bars.sort_by_key(|b| b.date);

        let (ma_short, ma_long, volatility) = indicator_columns(&bars);

        for i in 0..bars.len().saturating_sub(1) {
            let (Some(ms), Some(ml), Some(vol)) = (ma_short[i], ma_long[i], volatility[i]) else {
                continue;
            };
            let bar = &bars[i];
            rows.push(LabeledRow {
                symbol: symbol.clone(),
                date: bar.date,
                features: FeatureVector {
                    sentiment: *sentiment.get(&(bar.date, symbol.clone())).unwrap_or(&0.0),
                    close: bar.close,
                    ma_short: ms,
                    ma_long: ml,
                    volatility: vol,
                },
                label: bars[i + 1].close > bar.close,
            });
        }
    }

    rows.sort_by(|a, b| (a.symbol.as_str(), a.date).cmp(&(b.symbol.as_str(), b.date)));
    rows
}

/// The most recent complete feature vector for a bar series, with the given
/// aggregated sentiment attached. `None` when the history is too short for
/// a full indicator window.
pub fn latest_feature_vector(bars: &[PriceBar], sentiment: f64) -> Option<FeatureVector> {
    if bars.is_empty() {
        return None;
    }
    let mut bars = bars.to_vec();
    bars.sort_by_key(|b| b.date);

    let (ma_short, ma_long, volatility) = indicator_columns(&bars);
    let i = bars.len() - 1;

    Some(FeatureVector {
        sentiment,
        close: bars[i].close,
        ma_short: ma_short[i]?,
        ma_long: ma_long[i]?,
        volatility: volatility[i]?,
    })
}
