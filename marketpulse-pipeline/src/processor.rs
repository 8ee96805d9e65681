//! Polling stream processor: drains staging directories into the
//! partitioned store.
//!
//! Per poll cycle and per source, the processor snapshots the staging
//! directory, parses each file, scores sentiment, buffers results grouped
//! by partition date, writes one new batch file per date, and only then
//! archives the consumed raw files. The archive move is the commit signal:
//! a crash between batch write and archive replays the same files next
//! cycle, yielding duplicates but never losing a record (at-least-once).
//!
//! Parse failures are the one accepted stranding case: the file is logged
//! and left in staging for manual inspection, never archived and never
//! retried automatically.

use crate::config::PipelineConfig;
use crate::supervisor::ShutdownFlag;
use chrono::NaiveDate;
use marketpulse_core::record::{derive_partition_date, ProcessedRecord, StagingRecord};
use marketpulse_core::sentiment::SentimentAnalyzer;
use marketpulse_core::staging::{archive_file, pending_files, StagingError};
use marketpulse_core::store::{SentimentStore, StoreError};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a poll cycle. Per-record failures never surface here;
/// they are logged and counted in the [`PollSummary`].
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// What one poll cycle did for one source.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Files seen in the snapshot.
    pub scanned: usize,
    /// Records scored and written to a partition.
    pub processed: usize,
    /// Files that failed to parse and were left in place.
    pub skipped: usize,
    /// Batch files written (one per distinct partition date).
    pub batches: usize,
    /// Raw files moved to the archive.
    pub archived: usize,
}

/// The stream processor. One instance drains every configured source.
pub struct StreamProcessor {
    sources: Vec<String>,
    staging_root: PathBuf,
    archive_root: PathBuf,
    store: SentimentStore,
    analyzer: &'static SentimentAnalyzer,
    poll_interval: Duration,
}

impl StreamProcessor {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            sources: config.pipeline.sources.clone(),
            staging_root: config.staging_root(),
            archive_root: config.pipeline.data_dir.join("archive"),
            store: SentimentStore::new(config.processed_root()),
            analyzer: SentimentAnalyzer::shared(),
            poll_interval: config.poll_interval(),
        }
    }

    /// One poll cycle over every source.
    pub fn poll_once(&self) -> Vec<(String, Result<PollSummary, ProcessError>)> {
        self.sources
            .iter()
            .map(|source| (source.clone(), self.poll_source(source)))
            .collect()
    }

    /// One poll cycle for one source: read, score, batch-write, archive.
    pub fn poll_source(&self, source: &str) -> Result<PollSummary, ProcessError> {
        let staging_dir = self.staging_root.join(source);
        let files = pending_files(&staging_dir)?;

        let mut summary = PollSummary {
            scanned: files.len(),
            ..Default::default()
        };
        if files.is_empty() {
            return Ok(summary);
        }

        log::info!("processing {} new files from '{source}'", files.len());

        // Read and score everything first; group by partition date.
        let today = chrono::Local::now().date_naive();
        let mut buffer: BTreeMap<NaiveDate, Vec<ProcessedRecord>> = BTreeMap::new();
        let mut consumed: Vec<PathBuf> = Vec::new();

        for file in files {
            let record: StagingRecord = match fs::read_to_string(&file)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
            {
                Ok(record) => record,
                Err(e) => {
                    // Left in staging for manual inspection; not archived.
                    log::warn!("unparseable staging file {}: {e}", file.display());
                    summary.skipped += 1;
                    continue;
                }
            };

            let sentiment = self.analyzer.score(&record.body);
            let partition_date = derive_partition_date(&record.published_at, today);

            buffer.entry(partition_date).or_default().push(ProcessedRecord {
                record,
                sentiment,
                partition_date,
            });
            consumed.push(file);
        }

        // Batch writes for the whole cycle, one new file per partition date.
        // Any write failure aborts before a single archive move, so the
        // cycle replays in full next interval.
        for (date, records) in &buffer {
            let path = self.store.append_batch(source, *date, records)?;
            log::info!("wrote batch of {} records to {}", records.len(), path.display());
            summary.processed += records.len();
            summary.batches += 1;
        }

        // Commit: archive every successfully parsed raw file.
        let archive_dir = self.archive_root.join(source);
        for file in &consumed {
            match archive_file(file, &archive_dir) {
                Ok(_) => summary.archived += 1,
                // The record is already in a partition; a failed move only
                // means it may be reprocessed (at-least-once).
                Err(e) => log::warn!("failed to archive {}: {e}", file.display()),
            }
        }

        Ok(summary)
    }

    /// Standing service loop: poll every source, sleep, repeat until
    /// cancelled. A failed cycle for one source is logged and retried at
    /// the next interval.
    pub fn run(&self, shutdown: &ShutdownFlag) {
        log::info!(
            "stream processor watching {} under {}",
            self.sources.join(", "),
            self.staging_root.display()
        );
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            for (source, result) in self.poll_once() {
                if let Err(e) = result {
                    log::error!("poll cycle failed for '{source}': {e}");
                }
            }
            if !shutdown.sleep(self.poll_interval) {
                break;
            }
        }
        log::info!("stream processor stopped");
    }

    /// Read access to the partitioned store this processor writes.
    pub fn store(&self) -> &SentimentStore {
        &self.store
    }
}
