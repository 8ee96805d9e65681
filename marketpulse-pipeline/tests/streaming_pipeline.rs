//! End-to-end ingestion: staged JSON in, partitioned batches and archived
//! raw files out.

use marketpulse_core::record::StagingRecord;
use marketpulse_core::staging::{pending_files, StagingWriter};
use marketpulse_pipeline::{PipelineConfig, StreamProcessor};

fn test_config(dir: &std::path::Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.pipeline.data_dir = dir.join("data");
    config.pipeline.models_dir = dir.join("models");
    config.ensure_layout().unwrap();
    config
}

fn stage(config: &PipelineConfig, source: &str, symbol: &str, body: &str, published_at: &str) {
    let writer = StagingWriter::new(config.staging_root());
    writer
        .write(&StagingRecord {
            id: format!("{symbol}-{published_at}"),
            body: body.into(),
            published_at: published_at.into(),
            source: source.into(),
            symbol: symbol.into(),
            extra: serde_json::Map::new(),
        })
        .unwrap();
}

#[test]
fn staged_records_become_partitioned_batches_and_archives() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    stage(
        &config,
        "headlines",
        "TCS",
        "Record quarterly profit announced",
        "2024-03-05T09:30:00Z",
    );
    stage(
        &config,
        "headlines",
        "INFY",
        "Regulator opens fraud probe",
        "2024-03-06T11:00:00Z",
    );

    let processor = StreamProcessor::from_config(&config);
    let summary = processor.poll_source("headlines").unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.archived, 2);

    // Staging drained; one Hive-style partition per declared date.
    assert!(pending_files(&config.staging_dir("headlines"))
        .unwrap()
        .is_empty());
    for date in ["2024-03-05", "2024-03-06"] {
        let partition = config
            .processed_root()
            .join(format!("headlines/date={date}"));
        assert!(partition.is_dir(), "missing partition {date}");
        assert_eq!(std::fs::read_dir(&partition).unwrap().count(), 1);
    }

    // Positive and negative headlines score on opposite sides of neutral.
    let all = processor.store().read_all("headlines").unwrap();
    let tcs = all.iter().find(|r| r.record.symbol == "TCS").unwrap();
    let infy = all.iter().find(|r| r.record.symbol == "INFY").unwrap();
    assert!(tcs.sentiment > 0.0);
    assert!(infy.sentiment < 0.0);
}

#[test]
fn sources_are_isolated_directory_trees() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    stage(&config, "headlines", "TCS", "profits soar", "2024-03-05");
    stage(&config, "newswire", "TCS", "shares plunge on fraud probe", "2024-03-05");

    let processor = StreamProcessor::from_config(&config);
    for (_, result) in processor.poll_once() {
        result.unwrap();
    }

    assert_eq!(processor.store().read_all("headlines").unwrap().len(), 1);
    assert_eq!(processor.store().read_all("newswire").unwrap().len(), 1);

    // The sentiment mean only reads its own source tree.
    let headline_mean = processor.store().read_recent_mean("headlines", "TCS", 5);
    let newswire_mean = processor.store().read_recent_mean("newswire", "TCS", 5);
    assert!(headline_mean > 0.0);
    assert!(newswire_mean < 0.0);
}

#[test]
fn unknown_symbol_reads_neutral_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    stage(&config, "headlines", "TCS", "strong results", "2024-03-05");
    let processor = StreamProcessor::from_config(&config);
    processor.poll_source("headlines").unwrap();

    assert_eq!(
        processor.store().read_recent_mean("headlines", "NOSUCH", 5),
        0.0
    );
}

#[test]
fn malformed_file_strands_while_valid_neighbours_flow() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    std::fs::write(
        config.staging_dir("headlines").join("garbage.json"),
        "not json at all",
    )
    .unwrap();
    stage(&config, "headlines", "TCS", "profit warning", "2024-03-05");

    let processor = StreamProcessor::from_config(&config);

    // Two cycles: the bad file stays put, the store gains nothing extra.
    for expected_processed in [1usize, 0] {
        let summary = processor.poll_source("headlines").unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, expected_processed);
    }

    let leftover = pending_files(&config.staging_dir("headlines")).unwrap();
    assert_eq!(leftover.len(), 1);
    assert!(leftover[0].ends_with("garbage.json"));
    assert_eq!(processor.store().read_all("headlines").unwrap().len(), 1);
}

#[test]
fn interrupted_commit_replays_without_loss() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    stage(&config, "headlines", "TCS", "excellent growth", "2024-03-05");
    let processor = StreamProcessor::from_config(&config);
    processor.poll_source("headlines").unwrap();

    // Simulate a crash after the batch write but before the archive move:
    // the raw file reappears in staging and the cycle reruns.
    for entry in std::fs::read_dir(config.archive_dir("headlines"))
        .unwrap()
        .flatten()
    {
        std::fs::rename(
            entry.path(),
            config.staging_dir("headlines").join(entry.file_name()),
        )
        .unwrap();
    }
    processor.poll_source("headlines").unwrap();

    let all = processor.store().read_all("headlines").unwrap();
    assert_eq!(all.len(), 2, "at-least-once: duplicated, never lost");
    assert_eq!(all[0].sentiment, all[1].sentiment);
}
