//! Staged and processed record types.
//!
//! A `StagingRecord` is one self-contained ingested unit: a headline or
//! article title with its producer-assigned metadata, written once into a
//! staging directory and consumed at most once by the stream processor.
//! A `ProcessedRecord` is the same record after sentiment scoring, carrying
//! the normalized partition date used for columnar storage.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One raw ingested unit, as serialized by a producer into staging.
///
/// Immutable once written. `published_at` is whatever the producer saw and
/// may be malformed; the processor degrades gracefully (see
/// [`derive_partition_date`]). Unknown fields from the producer are captured
/// in `extra` and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    /// Producer-assigned unique id.
    pub id: String,
    /// Free-text body (headline or article title). May be empty.
    #[serde(default)]
    pub body: String,
    /// Producer-assigned creation timestamp, nominally ISO-8601.
    #[serde(default)]
    pub published_at: String,
    /// Origin system name; doubles as the staging directory name.
    pub source: String,
    /// Which tracked symbol this record pertains to.
    pub symbol: String,
    /// Opaque source-specific metadata, passed through to storage.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A staging record augmented with its sentiment score and partition date.
///
/// Created by the stream processor, appended to the partitioned store,
/// never mutated after write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    #[serde(flatten)]
    pub record: StagingRecord,
    /// Compound sentiment score in [-1, 1]. Empty body scores exactly 0.0.
    pub sentiment: f64,
    /// Calendar day this record partitions under.
    pub partition_date: NaiveDate,
}

/// Derive the partition date from a producer-declared timestamp.
///
/// Accepts RFC 3339 (with or without offset), a bare `%Y-%m-%dT%H:%M:%S`
/// datetime, or a bare `%Y-%m-%d` date. Anything else degrades to
/// `fallback` (the processing instant's calendar day) rather than failing
/// the record.
pub fn derive_partition_date(raw: &str, fallback: NaiveDate) -> NaiveDate {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.date_naive();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.date();
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d;
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn rfc3339_with_offset() {
        let d = derive_partition_date("2024-03-05T09:30:00+05:30", fallback());
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn rfc3339_zulu() {
        let d = derive_partition_date("2024-03-05T23:59:59Z", fallback());
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn naive_datetime_with_fraction() {
        let d = derive_partition_date("2024-03-05T09:30:00.123456", fallback());
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn bare_date() {
        let d = derive_partition_date("2024-03-05", fallback());
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn malformed_degrades_to_fallback() {
        assert_eq!(derive_partition_date("bad-date", fallback()), fallback());
        assert_eq!(derive_partition_date("", fallback()), fallback());
        assert_eq!(
            derive_partition_date("March 5, 2024 9:30 AM IST", fallback()),
            fallback()
        );
    }

    #[test]
    fn unknown_producer_fields_round_trip() {
        let json = r#"{
            "id": "abc123",
            "body": "Quarterly profit beats estimates",
            "published_at": "2024-03-05T09:30:00Z",
            "source": "newswire",
            "symbol": "INFY",
            "url": "https://example.com/a",
            "outlet": "Example News"
        }"#;

        let rec: StagingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.symbol, "INFY");
        assert_eq!(
            rec.extra.get("url").and_then(|v| v.as_str()),
            Some("https://example.com/a")
        );

        let back = serde_json::to_string(&rec).unwrap();
        let rec2: StagingRecord = serde_json::from_str(&back).unwrap();
        assert_eq!(rec, rec2);
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{"id":"x","source":"headlines","symbol":"TCS"}"#;
        let rec: StagingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.body, "");
        assert_eq!(rec.published_at, "");
    }
}
