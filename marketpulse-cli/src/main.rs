//! Command-line entry point: run the full supervised pipeline or exercise
//! individual stages by hand.

use anyhow::Context;
use clap::{Parser, Subcommand};
use marketpulse_core::prices::ChartApiProvider;
use marketpulse_core::staging::StagingWriter;
use marketpulse_pipeline::producers::{run_producer, NewsApiSource};
use marketpulse_pipeline::{
    read_predictions, run_cycle, run_scheduler, PipelineConfig, StreamProcessor, Supervisor,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "marketpulse", version, about = "News-sentiment stock direction pipeline")]
struct Cli {
    /// Path to the TOML config file; defaults apply when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline under supervision until interrupted.
    Run,
    /// Drain the staging directories into the partitioned store.
    Process {
        /// Poll once and exit instead of looping.
        #[arg(long)]
        once: bool,
    },
    /// Run a single train-then-predict cycle and exit.
    Cycle,
    /// Print the current predictions artifact.
    Predictions,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    config.ensure_layout().context("creating data directories")?;

    match cli.command {
        Command::Run => run_pipeline(config),
        Command::Process { once } => process(config, once),
        Command::Cycle => cycle(config),
        Command::Predictions => predictions(config),
    }
}

fn run_pipeline(config: PipelineConfig) -> anyhow::Result<()> {
    let mut supervisor = Supervisor::new();

    let flag = supervisor.shutdown_flag();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, shutting down");
        flag.trigger();
    })
    .context("installing interrupt handler")?;

    match config.news_api_key() {
        Some(key) => {
            let producer_config = config.clone();
            supervisor.spawn("producer", move |flag| {
                let writer = StagingWriter::new(producer_config.staging_root());
                let source = NewsApiSource::new(key, producer_config.news_api.page_size);
                run_producer(
                    &writer,
                    &source,
                    &producer_config.pipeline.symbols,
                    producer_config.fetch_interval(),
                    &flag,
                );
                Ok(())
            });
        }
        None => log::warn!("no news API key configured, producer disabled"),
    }

    let processor_config = config.clone();
    supervisor.spawn("processor", move |flag| {
        StreamProcessor::from_config(&processor_config).run(&flag);
        Ok(())
    });

    let scheduler_config = config.clone();
    supervisor.spawn("scheduler", move |flag| {
        let provider = ChartApiProvider::new();
        run_scheduler(&scheduler_config, &provider, &flag);
        Ok(())
    });

    supervisor.wait_for_shutdown();
    supervisor.request_shutdown();
    let report = supervisor.join(config.shutdown_grace());

    if report.clean() {
        log::info!("pipeline stopped cleanly");
        Ok(())
    } else {
        anyhow::bail!(
            "pipeline stopped with failures: crashed={:?} stuck={:?}",
            report.crashed,
            report.stuck
        );
    }
}

fn process(config: PipelineConfig, once: bool) -> anyhow::Result<()> {
    let processor = StreamProcessor::from_config(&config);
    if once {
        for (source, result) in processor.poll_once() {
            let summary = result.with_context(|| format!("polling '{source}'"))?;
            println!(
                "{source}: scanned {} processed {} skipped {} batches {} archived {}",
                summary.scanned,
                summary.processed,
                summary.skipped,
                summary.batches,
                summary.archived
            );
        }
        return Ok(());
    }

    let flag = marketpulse_pipeline::ShutdownFlag::new();
    let handler_flag = flag.clone();
    ctrlc::set_handler(move || handler_flag.trigger()).context("installing interrupt handler")?;
    processor.run(&flag);
    Ok(())
}

fn cycle(config: PipelineConfig) -> anyhow::Result<()> {
    let provider = ChartApiProvider::new();
    match run_cycle(&config, &provider) {
        Some(report) => {
            println!(
                "published {} predictions ({} skipped) to {}",
                report.predictions,
                report.skipped,
                report.artifact_path.display()
            );
            Ok(())
        }
        None => anyhow::bail!("cycle failed, see log for details"),
    }
}

fn predictions(config: PipelineConfig) -> anyhow::Result<()> {
    let path = config.predictions_path();
    let predictions = read_predictions(&path)
        .with_context(|| format!("reading predictions from {}", path.display()))?;

    if predictions.is_empty() {
        println!("no predictions in the current artifact");
        return Ok(());
    }
    for p in &predictions {
        println!(
            "{:<12} {:>10.2}  {:<4}  confidence {:.1}%  sentiment {:+.3}",
            p.symbol,
            p.current_price,
            p.direction,
            p.confidence * 100.0,
            p.sentiment
        );
    }
    Ok(())
}
