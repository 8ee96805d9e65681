//! Date-partitioned Parquet store for processed records.
//!
//! Layout: `{root}/{source}/date={YYYY-MM-DD}/part-{unix_secs}-{4 hex rand}.parquet`
//!
//! Every poll cycle that found records for a partition appends one wholly
//! new batch file; batch files are never rewritten or merged. Writes go to
//! a `.tmp` sibling and are renamed into place, so readers never observe a
//! partial batch. Duplicate records (the at-least-once replay case) are not
//! deduplicated here; aggregation averages them out.

use crate::record::{ProcessedRecord, StagingRecord};
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Errors from the partitioned store. Read-side aggregation APIs degrade to
/// neutral defaults instead of surfacing these.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("batch validation error: {0}")]
    Validation(String),
}

/// The partitioned sentiment store.
pub struct SentimentStore {
    root: PathBuf,
}

impl SentimentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn source_dir(&self, source: &str) -> PathBuf {
        self.root.join(source)
    }

    /// Directory for one (source, date) partition.
    fn partition_dir(&self, source: &str, date: NaiveDate) -> PathBuf {
        self.source_dir(source).join(format!("date={date}"))
    }

    /// Append one new batch file to a partition.
    ///
    /// The batch is written to a `.tmp` path and atomically renamed into
    /// place. Previously committed batches are never touched, so a crash
    /// mid-write cannot corrupt the partition.
    pub fn append_batch(
        &self,
        source: &str,
        date: NaiveDate,
        records: &[ProcessedRecord],
    ) -> Result<PathBuf, StoreError> {
        if records.is_empty() {
            return Err(StoreError::Validation("empty batch".into()));
        }

        let dir = self.partition_dir(source, date);
        fs::create_dir_all(&dir).map_err(|e| StoreError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let name = format!(
            "part-{}-{:04x}.parquet",
            chrono::Utc::now().timestamp(),
            rand::random::<u16>()
        );
        let path = dir.join(name);
        let tmp_path = path.with_extension("parquet.tmp");

        let df = records_to_dataframe(records)?;
        write_parquet(&df, &tmp_path)?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io {
                path: path.clone(),
                source: e,
            }
        })?;

        Ok(path)
    }

    /// Mean sentiment over the `max_partitions` most recently modified
    /// partitions of a source, filtered to one symbol.
    ///
    /// Absence of data (missing source directory, no partitions, no batch
    /// for the symbol, unreadable files) returns the neutral 0.0, never an
    /// error. Sentiment must never block a prediction.
    pub fn read_recent_mean(&self, source: &str, symbol: &str, max_partitions: usize) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;

        for dir in self.recent_partitions(source, max_partitions) {
            for file in partition_batch_files(&dir) {
                let records = match read_batch(&file) {
                    Ok(r) => r,
                    Err(e) => {
                        log::warn!("skipping unreadable batch {}: {e}", file.display());
                        continue;
                    }
                };
                for rec in records {
                    if rec.record.symbol == symbol {
                        sum += rec.sentiment;
                        count += 1;
                    }
                }
            }
        }

        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// All processed records for a source, across every partition.
    ///
    /// Unreadable batch files are logged and skipped; they never fail the
    /// scan.
    pub fn read_all(&self, source: &str) -> Result<Vec<ProcessedRecord>, StoreError> {
        let mut all = Vec::new();
        for dir in self.partitions(source)? {
            for file in partition_batch_files(&dir) {
                match read_batch(&file) {
                    Ok(records) => all.extend(records),
                    Err(e) => log::warn!("skipping unreadable batch {}: {e}", file.display()),
                }
            }
        }
        Ok(all)
    }

    /// The most recent `limit` processed records for one symbol, newest
    /// partition first. Serving-side read; absence yields an empty list.
    pub fn read_recent_records(
        &self,
        source: &str,
        symbol: &str,
        limit: usize,
    ) -> Vec<ProcessedRecord> {
        let mut matched: Vec<ProcessedRecord> = Vec::new();
        for dir in self.recent_partitions(source, usize::MAX) {
            for file in partition_batch_files(&dir) {
                if let Ok(records) = read_batch(&file) {
                    matched.extend(records.into_iter().filter(|r| r.record.symbol == symbol));
                }
            }
            if matched.len() >= limit {
                break;
            }
        }
        matched.sort_by(|a, b| b.partition_date.cmp(&a.partition_date));
        matched.truncate(limit);
        matched
    }

    /// All partition directories for a source.
    fn partitions(&self, source: &str) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.source_dir(source);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|e| StoreError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let mut dirs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir() && name.starts_with("date=") {
                dirs.push(path);
            }
        }
        Ok(dirs)
    }

    /// Partition directories ranked by modification time, newest first.
    fn recent_partitions(&self, source: &str, max_partitions: usize) -> Vec<PathBuf> {
        let mut dirs: Vec<(SystemTime, PathBuf)> = self
            .partitions(source)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| {
                let mtime = fs::metadata(&p).and_then(|m| m.modified()).ok()?;
                Some((mtime, p))
            })
            .collect();
        dirs.sort_by(|a, b| b.0.cmp(&a.0));
        dirs.truncate(max_partitions);
        dirs.into_iter().map(|(_, p)| p).collect()
    }
}

/// Immutable batch files inside one partition directory.
fn partition_batch_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("parquet"))
        .collect()
}

// ── Parquet I/O ─────────────────────────────────────────────────────

const COLUMNS: [&str; 8] = [
    "id",
    "body",
    "published_at",
    "source",
    "symbol",
    "extra",
    "sentiment",
    "date",
];

fn records_to_dataframe(records: &[ProcessedRecord]) -> Result<DataFrame, StoreError> {
    let ids: Vec<&str> = records.iter().map(|r| r.record.id.as_str()).collect();
    let bodies: Vec<&str> = records.iter().map(|r| r.record.body.as_str()).collect();
    let published: Vec<&str> = records
        .iter()
        .map(|r| r.record.published_at.as_str())
        .collect();
    let sources: Vec<&str> = records.iter().map(|r| r.record.source.as_str()).collect();
    let symbols: Vec<&str> = records.iter().map(|r| r.record.symbol.as_str()).collect();
    let extras: Vec<String> = records
        .iter()
        .map(|r| serde_json::to_string(&r.record.extra).unwrap_or_else(|_| "{}".into()))
        .collect();
    let sentiments: Vec<f64> = records.iter().map(|r| r.sentiment).collect();
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let dates: Vec<i32> = records
        .iter()
        .map(|r| (r.partition_date - epoch).num_days() as i32)
        .collect();

    DataFrame::new(vec![
        Column::new("id".into(), ids),
        Column::new("body".into(), bodies),
        Column::new("published_at".into(), published),
        Column::new("source".into(), sources),
        Column::new("symbol".into(), symbols),
        Column::new("extra".into(), extras),
        Column::new("sentiment".into(), sentiments),
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| StoreError::Parquet(format!("date cast: {e}")))?,
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    let file = fs::File::create(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

/// Load one batch file back into records, validating the schema.
pub fn read_batch(path: &Path) -> Result<Vec<ProcessedRecord>, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read parquet: {e}")))?;

    if df.height() == 0 {
        return Err(StoreError::Validation("empty batch file".into()));
    }
    for col in &COLUMNS {
        if df.column(col).is_err() {
            return Err(StoreError::Validation(format!("missing column '{col}'")));
        }
    }

    dataframe_to_records(&df)
}

fn dataframe_to_records(df: &DataFrame) -> Result<Vec<ProcessedRecord>, StoreError> {
    let col_err = |e: PolarsError| StoreError::Parquet(format!("column read: {e}"));
    let type_err = |name: &str, e: PolarsError| {
        StoreError::Parquet(format!("{name} column type: {e}"))
    };

    let ids = df.column("id").map_err(col_err)?.str().map_err(|e| type_err("id", e))?;
    let bodies = df
        .column("body")
        .map_err(col_err)?
        .str()
        .map_err(|e| type_err("body", e))?;
    let published = df
        .column("published_at")
        .map_err(col_err)?
        .str()
        .map_err(|e| type_err("published_at", e))?;
    let sources = df
        .column("source")
        .map_err(col_err)?
        .str()
        .map_err(|e| type_err("source", e))?;
    let symbols = df
        .column("symbol")
        .map_err(col_err)?
        .str()
        .map_err(|e| type_err("symbol", e))?;
    let extras = df
        .column("extra")
        .map_err(col_err)?
        .str()
        .map_err(|e| type_err("extra", e))?;
    let sentiments = df
        .column("sentiment")
        .map_err(col_err)?
        .f64()
        .map_err(|e| type_err("sentiment", e))?;
    let dates = df
        .column("date")
        .map_err(col_err)?
        .date()
        .map_err(|e| type_err("date", e))?;

    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let n = df.height();
    let mut records = Vec::with_capacity(n);

    for i in 0..n {
        let date_days = dates
            .get(i)
            .ok_or_else(|| StoreError::Parquet(format!("null date at row {i}")))?;
        let partition_date = epoch + chrono::Duration::days(date_days as i64);

        let extra = extras
            .get(i)
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();

        records.push(ProcessedRecord {
            record: StagingRecord {
                id: ids.get(i).unwrap_or_default().to_string(),
                body: bodies.get(i).unwrap_or_default().to_string(),
                published_at: published.get(i).unwrap_or_default().to_string(),
                source: sources.get(i).unwrap_or_default().to_string(),
                symbol: symbols.get(i).unwrap_or_default().to_string(),
                extra,
            },
            sentiment: sentiments.get(i).unwrap_or(0.0),
            partition_date,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, symbol: &str, sentiment: f64, date: NaiveDate) -> ProcessedRecord {
        ProcessedRecord {
            record: StagingRecord {
                id: id.into(),
                body: format!("headline for {symbol}"),
                published_at: date.to_string(),
                source: "headlines".into(),
                symbol: symbol.into(),
                extra: serde_json::Map::new(),
            },
            sentiment,
            partition_date: date,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn roundtrip_across_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SentimentStore::new(dir.path());

        store
            .append_batch("headlines", day(1), &[record("a", "TCS", 0.5, day(1))])
            .unwrap();
        store
            .append_batch(
                "headlines",
                day(2),
                &[
                    record("b", "TCS", -0.25, day(2)),
                    record("c", "INFY", 0.75, day(2)),
                ],
            )
            .unwrap();

        let all = store.read_all("headlines").unwrap();
        assert_eq!(all.len(), 3);

        let mut scores: Vec<f64> = all.iter().map(|r| r.sentiment).collect();
        scores.sort_by(f64::total_cmp);
        assert_eq!(scores, vec![-0.25, 0.5, 0.75]);
    }

    #[test]
    fn two_cycles_same_partition_two_batch_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SentimentStore::new(dir.path());

        store
            .append_batch("headlines", day(1), &[record("a", "TCS", 0.2, day(1))])
            .unwrap();
        store
            .append_batch("headlines", day(1), &[record("b", "TCS", 0.6, day(1))])
            .unwrap();

        let partition = dir.path().join("headlines/date=2024-03-01");
        let batches = partition_batch_files(&partition);
        assert_eq!(batches.len(), 2);

        // Averaging reads across both batch files.
        let mean = store.read_recent_mean("headlines", "TCS", 5);
        assert!((mean - 0.4).abs() < 1e-12, "got {mean}");
    }

    #[test]
    fn read_recent_mean_filters_by_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let store = SentimentStore::new(dir.path());

        store
            .append_batch(
                "headlines",
                day(1),
                &[
                    record("a", "TCS", 1.0, day(1)),
                    record("b", "INFY", -1.0, day(1)),
                ],
            )
            .unwrap();

        assert_eq!(store.read_recent_mean("headlines", "TCS", 5), 1.0);
        assert_eq!(store.read_recent_mean("headlines", "INFY", 5), -1.0);
    }

    #[test]
    fn recency_window_excludes_older_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SentimentStore::new(dir.path());

        for d in 1..=6 {
            store
                .append_batch(
                    "headlines",
                    day(d),
                    &[record(&format!("r{d}"), "TCS", 0.1 * d as f64, day(d))],
                )
                .unwrap();
            // Keep partition mtimes distinct so recency ranking is
            // unambiguous even on coarse filesystems.
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        // Only the two newest partitions (0.5 and 0.6) feed the mean.
        let mean = store.read_recent_mean("headlines", "TCS", 2);
        assert!((mean - 0.55).abs() < 1e-12, "got {mean}");

        // Widening the window pulls the older partitions back in.
        let full = store.read_recent_mean("headlines", "TCS", 6);
        assert!((full - 0.35).abs() < 1e-12, "got {full}");
    }

    #[test]
    fn read_recent_mean_absent_data_is_neutral() {
        let dir = tempfile::tempdir().unwrap();
        let store = SentimentStore::new(dir.path());

        // Missing source dir entirely.
        assert_eq!(store.read_recent_mean("headlines", "TCS", 5), 0.0);

        // Source exists but symbol has no records.
        store
            .append_batch("headlines", day(1), &[record("a", "INFY", 0.9, day(1))])
            .unwrap();
        assert_eq!(store.read_recent_mean("headlines", "TCS", 5), 0.0);
    }

    #[test]
    fn corrupt_batch_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = SentimentStore::new(dir.path());

        store
            .append_batch("headlines", day(1), &[record("a", "TCS", 0.5, day(1))])
            .unwrap();

        let partition = dir.path().join("headlines/date=2024-03-01");
        fs::write(partition.join("part-bogus.parquet"), b"not parquet").unwrap();

        let all = store.read_all("headlines").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(store.read_recent_mean("headlines", "TCS", 5), 0.5);
    }

    #[test]
    fn empty_batch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SentimentStore::new(dir.path());
        assert!(store.append_batch("headlines", day(1), &[]).is_err());
    }

    #[test]
    fn no_tmp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = SentimentStore::new(dir.path());

        store
            .append_batch("headlines", day(1), &[record("a", "TCS", 0.5, day(1))])
            .unwrap();

        let partition = dir.path().join("headlines/date=2024-03-01");
        let leftovers: Vec<_> = fs::read_dir(&partition)
            .unwrap()
            .flatten()
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn recent_records_newest_first_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        let store = SentimentStore::new(dir.path());

        for d in 1..=4 {
            store
                .append_batch(
                    "headlines",
                    day(d),
                    &[record(&format!("r{d}"), "TCS", 0.1 * d as f64, day(d))],
                )
                .unwrap();
        }

        let recent = store.read_recent_records("headlines", "TCS", 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].partition_date, day(4));
        assert_eq!(recent[1].partition_date, day(3));
    }
}
