//! News producers: pull headlines from an external feed and stage them as
//! raw JSON records.
//!
//! Producers are fire-and-forget: every article becomes one staging file
//! and the processor takes it from there. A failed fetch for one symbol is
//! logged and skipped; the loop keeps running.

use crate::supervisor::ShutdownFlag;
use marketpulse_core::record::StagingRecord;
use marketpulse_core::staging::StagingWriter;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Request(String),

    #[error("feed response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("feed rejected the request: {0}")]
    Rejected(String),
}

/// A source of staging records, mockable in tests.
pub trait NewsSource: Send + Sync {
    /// Human-readable name of this feed.
    fn name(&self) -> &str;

    /// Source tag stamped on every record (selects the staging directory).
    fn source_tag(&self) -> &str;

    /// Fetch the current articles for the given symbols.
    fn poll(&self, symbols: &[String]) -> Result<Vec<StagingRecord>, FeedError>;
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "publishedAt")]
    published_at: Option<String>,
    #[serde(default)]
    source: NewsApiOutlet,
}

#[derive(Debug, Default, Deserialize)]
struct NewsApiOutlet {
    #[serde(default)]
    name: Option<String>,
}

/// Headline feed backed by the newsapi.org "everything" endpoint.
pub struct NewsApiSource {
    client: reqwest::blocking::Client,
    api_key: String,
    page_size: u32,
    base_url: String,
}

impl NewsApiSource {
    const DEFAULT_BASE_URL: &'static str = "https://newsapi.org/v2/everything";
    const DEFAULT_PAGE_SIZE: u32 = 10;

    pub fn new(api_key: String, page_size: u32) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            client,
            api_key,
            page_size: if page_size == 0 {
                Self::DEFAULT_PAGE_SIZE
            } else {
                page_size
            },
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    fn fetch_symbol(&self, symbol: &str) -> Result<Vec<StagingRecord>, FeedError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", symbol),
                ("sortBy", "publishedAt"),
                ("pageSize", &self.page_size.to_string()),
                ("language", "en"),
                ("apiKey", &self.api_key),
            ])
            .send()
            .map_err(|e| FeedError::Request(e.to_string()))?;

        let body: NewsApiResponse = response
            .json()
            .map_err(|e| FeedError::ResponseFormatChanged(e.to_string()))?;

        if body.status != "ok" {
            return Err(FeedError::Rejected(
                body.message.unwrap_or_else(|| body.status.clone()),
            ));
        }

        Ok(body
            .articles
            .into_iter()
            .filter_map(|a| article_to_record(a, symbol))
            .collect())
    }
}

/// Articles without a title carry no scoreable text and are dropped.
fn article_to_record(article: NewsApiArticle, symbol: &str) -> Option<StagingRecord> {
    let title = article.title.filter(|t| !t.is_empty())?;
    let url = article.url.unwrap_or_default();

    // Stable id from the article identity, so replayed fetches of the same
    // story produce recognizably duplicate records downstream.
    let mut hasher = blake3::Hasher::new();
    hasher.update(url.as_bytes());
    hasher.update(title.as_bytes());
    let id = hasher.finalize().to_hex()[..16].to_string();

    let mut extra = serde_json::Map::new();
    extra.insert("url".into(), serde_json::Value::String(url));
    if let Some(description) = article.description {
        extra.insert("description".into(), serde_json::Value::String(description));
    }
    if let Some(outlet) = article.source.name {
        extra.insert("outlet".into(), serde_json::Value::String(outlet));
    }

    Some(StagingRecord {
        id,
        body: title,
        published_at: article.published_at.unwrap_or_default(),
        source: String::new(), // stamped by the caller
        symbol: symbol.to_string(),
        extra,
    })
}

impl NewsSource for NewsApiSource {
    fn name(&self) -> &str {
        "newsapi"
    }

    fn source_tag(&self) -> &str {
        "headlines"
    }

    fn poll(&self, symbols: &[String]) -> Result<Vec<StagingRecord>, FeedError> {
        let mut records = Vec::new();
        for symbol in symbols {
            match self.fetch_symbol(symbol) {
                Ok(mut batch) => records.append(&mut batch),
                Err(e) => log::warn!("headline fetch failed for {symbol}: {e}"),
            }
        }
        Ok(records)
    }
}

/// Stage every record from one poll of a source.
///
/// Failures stay local to the record they hit: a record that cannot be
/// written is logged and dropped, and the rest of the batch still stages.
/// Returns the number of records written.
pub fn stage_poll(writer: &StagingWriter, source: &dyn NewsSource, symbols: &[String]) -> usize {
    let records = match source.poll(symbols) {
        Ok(records) => records,
        Err(e) => {
            log::warn!("poll failed for feed '{}': {e}", source.name());
            return 0;
        }
    };

    let mut staged = 0usize;
    for mut record in records {
        record.source = source.source_tag().to_string();
        match writer.write(&record) {
            Ok(_) => staged += 1,
            Err(e) => log::warn!(
                "dropping record {} from '{}': {e}",
                record.id,
                source.name()
            ),
        }
    }
    staged
}

/// Standing producer loop: poll, stage, sleep, repeat until cancelled.
pub fn run_producer(
    writer: &StagingWriter,
    source: &dyn NewsSource,
    symbols: &[String],
    fetch_interval: Duration,
    shutdown: &ShutdownFlag,
) {
    log::info!(
        "producer '{}' staging as '{}' every {:?}",
        source.name(),
        source.source_tag(),
        fetch_interval
    );
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        let staged = stage_poll(writer, source, symbols);
        if staged > 0 {
            log::info!("staged {staged} records from '{}'", source.name());
        }
        if !shutdown.sleep(fetch_interval) {
            break;
        }
    }
    log::info!("producer '{}' stopped", source.name());
}
