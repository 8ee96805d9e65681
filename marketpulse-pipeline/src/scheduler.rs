//! Train/predict scheduler: strictly ordered cycles on a fixed interval.
//!
//! Each cycle trains first and predicts only on training success, so a
//! published prediction always comes from a model at least as fresh as the
//! last successful train. A failed train skips prediction for the whole
//! cycle and leaves both artifacts untouched; the loop itself never dies.

use crate::config::PipelineConfig;
use crate::predictor::{run_prediction, PredictReport};
use crate::supervisor::ShutdownFlag;
use crate::trainer::run_training;
use marketpulse_core::prices::PriceProvider;

/// One train-then-predict cycle.
///
/// Returns the prediction report when the full cycle ran, `None` when
/// training failed and prediction was skipped.
pub fn run_cycle(config: &PipelineConfig, provider: &dyn PriceProvider) -> Option<PredictReport> {
    match run_training(config, provider) {
        Ok(report) => {
            log::info!(
                "training complete: {} rows, holdout accuracy {:.3}{}",
                report.rows,
                report.holdout_accuracy,
                if report.synthetic { " (synthetic)" } else { "" }
            );
        }
        Err(e) => {
            log::error!("training failed, skipping prediction this cycle: {e}");
            return None;
        }
    }

    match run_prediction(config, provider) {
        Ok(report) => Some(report),
        Err(e) => {
            log::error!("prediction failed: {e}");
            None
        }
    }
}

/// Standing scheduler loop: warm-up delay, then cycle and sleep until
/// cancelled.
pub fn run_scheduler(
    config: &PipelineConfig,
    provider: &dyn PriceProvider,
    shutdown: &ShutdownFlag,
) {
    log::info!(
        "scheduler starting: first cycle in {:?}, then every {:?}",
        config.initial_delay(),
        config.retrain_interval()
    );
    if !shutdown.sleep(config.initial_delay()) {
        return;
    }

    loop {
        run_cycle(config, provider);
        if !shutdown.sleep(config.retrain_interval()) {
            break;
        }
    }
    log::info!("scheduler stopped");
}
