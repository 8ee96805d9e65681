//! Train/predict cycle against a mocked price feed: staged sentiment flows
//! through the store into published predictions.

use chrono::NaiveDate;
use marketpulse_core::prices::{PriceBar, PriceError, PriceProvider};
use marketpulse_core::record::StagingRecord;
use marketpulse_core::staging::StagingWriter;
use marketpulse_pipeline::{read_predictions, run_cycle, PipelineConfig, StreamProcessor};
use std::collections::HashSet;

/// Deterministic zig-zag walk; symbols in `fail` error out per call.
struct MockProvider {
    fail: HashSet<String>,
}

impl MockProvider {
    fn new<const N: usize>(fail: [&str; N]) -> Self {
        Self {
            fail: fail.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PriceProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PriceError> {
        let base = symbol.trim_end_matches(".NS");
        if self.fail.contains(base) {
            return Err(PriceError::NetworkUnreachable("feed down".into()));
        }
        let mut bars = Vec::new();
        let mut close = 750.0;
        let mut date = start;
        let mut i = 0u32;
        while date <= end {
            close *= if i % 2 == 0 { 1.015 } else { 0.992 };
            bars.push(PriceBar {
                symbol: symbol.to_string(),
                date,
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 10_000,
            });
            date = date.succ_opt().unwrap();
            i += 1;
        }
        Ok(bars)
    }
}

fn test_config(dir: &std::path::Path, symbols: &[&str]) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.pipeline.data_dir = dir.join("data");
    config.pipeline.models_dir = dir.join("models");
    config.pipeline.symbols = symbols.iter().map(|s| s.to_string()).collect();
    config.pipeline.training_history_days = 120;
    config.pipeline.prediction_history_days = 30;
    config.ensure_layout().unwrap();
    config
}

fn stage_headline(config: &PipelineConfig, symbol: &str, body: &str) {
    let writer = StagingWriter::new(config.staging_root());
    writer
        .write(&StagingRecord {
            id: format!("{symbol}-{body}"),
            body: body.into(),
            published_at: chrono::Local::now().date_naive().to_string(),
            source: "headlines".into(),
            symbol: symbol.into(),
            extra: serde_json::Map::new(),
        })
        .unwrap();
}

#[test]
fn full_cycle_publishes_a_call_per_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["TCS", "INFY"]);
    let provider = MockProvider::new([]);

    // Ingest some sentiment first so predictions carry a non-neutral value.
    stage_headline(&config, "TCS", "Stellar earnings beat all estimates");
    let processor = StreamProcessor::from_config(&config);
    processor.poll_source("headlines").unwrap();

    let report = run_cycle(&config, &provider).unwrap();
    assert_eq!(report.predictions, 2);
    assert_eq!(report.skipped, 0);

    let predictions = read_predictions(&config.predictions_path()).unwrap();
    assert_eq!(predictions.len(), 2);
    for p in &predictions {
        assert!(p.confidence >= 0.5 && p.confidence <= 1.0);
        assert!(p.current_price > 0.0);
        assert!(!p.generated_at.is_empty());
    }

    let tcs = predictions.iter().find(|p| p.symbol == "TCS").unwrap();
    let infy = predictions.iter().find(|p| p.symbol == "INFY").unwrap();
    assert!(tcs.sentiment > 0.0, "staged headline must reach the call");
    assert_eq!(infy.sentiment, 0.0, "no news means neutral");
}

#[test]
fn failing_symbol_is_omitted_others_still_published() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["TCS", "INFY", "WIPRO"]);
    let provider = MockProvider::new(["INFY"]);

    let report = run_cycle(&config, &provider).unwrap();
    assert_eq!(report.predictions, 2);
    assert_eq!(report.skipped, 1);

    let symbols: Vec<String> = read_predictions(&config.predictions_path())
        .unwrap()
        .into_iter()
        .map(|p| p.symbol)
        .collect();
    assert_eq!(symbols, vec!["TCS", "WIPRO"]);
}

#[test]
fn all_symbols_failing_at_prediction_still_publishes_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["TCS"]);

    // Train once with a healthy feed so a model exists.
    let healthy = MockProvider::new([]);
    run_cycle(&config, &healthy).unwrap();

    // Next cycle the feed dies entirely. Training fails (no history for
    // any symbol) so the whole cycle is skipped and the previous artifact
    // survives untouched.
    let dead = MockProvider::new(["TCS"]);
    assert!(run_cycle(&config, &dead).is_none());
    assert_eq!(read_predictions(&config.predictions_path()).unwrap().len(), 1);

    // But a prediction-only pass against the dead feed publishes an empty
    // list rather than leaving the stale one in place.
    let report = marketpulse_pipeline::run_prediction(&config, &dead).unwrap();
    assert_eq!(report.predictions, 0);
    assert_eq!(report.skipped, 1);
    assert!(read_predictions(&config.predictions_path()).unwrap().is_empty());
}

#[test]
fn no_model_on_disk_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["TCS"]);
    let provider = MockProvider::new([]);

    let err = marketpulse_pipeline::run_prediction(&config, &provider).unwrap_err();
    assert!(err.to_string().contains("model"));
    assert!(!config.predictions_path().exists());
}

#[test]
fn repeated_cycles_replace_the_artifact_wholesale() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["TCS", "INFY"]);

    run_cycle(&config, &MockProvider::new([])).unwrap();
    let first = read_predictions(&config.predictions_path()).unwrap();
    assert_eq!(first.len(), 2);

    run_cycle(&config, &MockProvider::new(["INFY"])).unwrap();
    let predictions = read_predictions(&config.predictions_path()).unwrap();
    assert_eq!(predictions.len(), 1, "stale symbols never linger");
    assert_eq!(predictions[0].symbol, "TCS");

    // Each successful cycle stamps a fresh, later generation time.
    let earlier = chrono::DateTime::parse_from_rfc3339(&first[0].generated_at).unwrap();
    let later = chrono::DateTime::parse_from_rfc3339(&predictions[0].generated_at).unwrap();
    assert!(later > earlier, "{later} should be after {earlier}");
}
