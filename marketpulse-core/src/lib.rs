//! Domain types and storage primitives for the news-sentiment prediction
//! pipeline.
//!
//! This crate owns the pieces shared by producers, the stream processor,
//! and the train/predict cycle:
//! - Staged and processed record types with partition-date derivation
//! - The lexicon sentiment scorer
//! - The staging directory protocol (write / enumerate / archive)
//! - The date-partitioned Parquet store
//! - The price-feed collaborator interface

pub mod prices;
pub mod record;
pub mod sentiment;
pub mod staging;
pub mod store;

pub use prices::{recent_history, ChartApiProvider, PriceBar, PriceError, PriceProvider};
pub use record::{derive_partition_date, ProcessedRecord, StagingRecord};
pub use sentiment::SentimentAnalyzer;
pub use staging::{archive_file, pending_files, StagingError, StagingWriter};
pub use store::{SentimentStore, StoreError};
