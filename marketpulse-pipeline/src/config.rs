//! Pipeline configuration: symbols, intervals, and the on-disk layout.
//!
//! Everything is supplied at process start and fixed for the process
//! lifetime. Loaded from a TOML file with serde defaults for every field,
//! so an empty `[pipeline]` table is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level config file shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub news_api: NewsApiSection,
}

/// Core pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Tracked symbols, without exchange suffix.
    pub symbols: Vec<String>,
    /// Suffix appended when querying the price feed (e.g. ".NS").
    pub ticker_suffix: String,
    /// Staging source types; one staging/processed/archive directory each.
    pub sources: Vec<String>,
    /// Source whose aggregated sentiment feeds predictions.
    pub sentiment_source: String,
    /// Root of the staging/processed/archive tree.
    pub data_dir: PathBuf,
    /// Directory holding the model artifact.
    pub models_dir: PathBuf,
    /// Stream processor polling interval, seconds.
    pub poll_interval_secs: u64,
    /// Producer fetch interval, seconds.
    pub fetch_interval_secs: u64,
    /// Sleep between train/predict cycle completions, seconds.
    pub retrain_interval_secs: u64,
    /// Scheduler warm-up delay before the first cycle, seconds.
    pub initial_delay_secs: u64,
    /// Supervisor grace period on shutdown, seconds.
    pub shutdown_grace_secs: u64,
    /// How many recent partitions feed the prediction-time sentiment mean.
    pub sentiment_partitions: usize,
    /// Trailing price history pulled for training, days.
    pub training_history_days: i64,
    /// Trailing price window pulled per symbol at prediction time, days.
    pub prediction_history_days: i64,
    /// Below this many feature rows, training falls back to synthetic data.
    pub min_training_rows: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            symbols: [
                "RELIANCE",
                "TCS",
                "INFY",
                "HDFCBANK",
                "ICICIBANK",
                "SBIN",
                "AXISBANK",
                "HCLTECH",
                "BHARTIARTL",
                "WIPRO",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ticker_suffix: ".NS".into(),
            sources: vec!["headlines".into(), "newswire".into()],
            sentiment_source: "headlines".into(),
            data_dir: PathBuf::from("data"),
            models_dir: PathBuf::from("models"),
            poll_interval_secs: 5,
            fetch_interval_secs: 60,
            retrain_interval_secs: 600,
            initial_delay_secs: 60,
            shutdown_grace_secs: 5,
            sentiment_partitions: 5,
            training_history_days: 730,
            prediction_history_days: 90,
            min_training_rows: 50,
        }
    }
}

/// News-API producer settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsApiSection {
    /// API key; the `MARKETPULSE_NEWS_API_KEY` env var takes precedence.
    pub key: String,
    /// Articles requested per symbol per poll.
    pub page_size: u32,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.symbols.is_empty() {
            return Err(ConfigError::Validation("symbols list is empty".into()));
        }
        if p.sources.is_empty() {
            return Err(ConfigError::Validation("sources list is empty".into()));
        }
        if !p.sources.contains(&p.sentiment_source) {
            return Err(ConfigError::Validation(format!(
                "sentiment_source '{}' is not in sources",
                p.sentiment_source
            )));
        }
        if p.poll_interval_secs == 0 || p.retrain_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll and retrain intervals must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Price-feed ticker for a tracked symbol.
    pub fn ticker(&self, symbol: &str) -> String {
        format!("{symbol}{}", self.pipeline.ticker_suffix)
    }

    pub fn staging_root(&self) -> PathBuf {
        self.pipeline.data_dir.join("staging")
    }

    pub fn staging_dir(&self, source: &str) -> PathBuf {
        self.staging_root().join(source)
    }

    pub fn processed_root(&self) -> PathBuf {
        self.pipeline.data_dir.join("processed")
    }

    pub fn archive_dir(&self, source: &str) -> PathBuf {
        self.pipeline.data_dir.join("archive").join(source)
    }

    /// The single predictions artifact, atomically replaced each cycle.
    pub fn predictions_path(&self) -> PathBuf {
        self.pipeline.data_dir.join("latest_predictions.json")
    }

    /// The model artifact, overwritten on each successful training run.
    pub fn model_path(&self) -> PathBuf {
        self.pipeline.models_dir.join("direction_model.json")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.pipeline.poll_interval_secs)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.pipeline.fetch_interval_secs)
    }

    pub fn retrain_interval(&self) -> Duration {
        Duration::from_secs(self.pipeline.retrain_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.pipeline.initial_delay_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.pipeline.shutdown_grace_secs)
    }

    /// News-API key, preferring the environment over the file.
    pub fn news_api_key(&self) -> Option<String> {
        std::env::var("MARKETPULSE_NEWS_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| {
                if self.news_api.key.is_empty() {
                    None
                } else {
                    Some(self.news_api.key.clone())
                }
            })
    }

    /// Create the staging/processed/archive/model directories.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        for source in &self.pipeline.sources {
            std::fs::create_dir_all(self.staging_dir(source))?;
            std::fs::create_dir_all(self.archive_dir(source))?;
            std::fs::create_dir_all(self.processed_root().join(source))?;
        }
        std::fs::create_dir_all(&self.pipeline.models_dir)?;
        Ok(())
    }
}
