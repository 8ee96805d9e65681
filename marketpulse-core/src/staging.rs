//! Staging directory protocol: the producer-side write contract and the
//! processor-side enumeration/archival primitives.
//!
//! Layout: `{staging_root}/{source}/` holds one JSON file per record.
//! Filenames are `{source}_{unix_secs}_{8 hex rand}.json`: unique across
//! concurrent writers, otherwise opaque. Downstream assumes no ordering
//! between files.
//!
//! The archive move is the processor's commit signal: a record is "done"
//! exactly when its raw file has been renamed into
//! `{archive_root}/{source}/`.

use crate::record::StagingRecord;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the staging layer.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staging I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("staging serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Producer-side writer: one new file per record.
pub struct StagingWriter {
    root: PathBuf,
}

impl StagingWriter {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            root: staging_root.into(),
        }
    }

    /// Serialize one record into the staging directory for its source.
    ///
    /// Returns the path of the new file. Uniqueness comes from the
    /// time-based prefix plus a random suffix; two writers can never
    /// produce the same name in practice.
    pub fn write(&self, record: &StagingRecord) -> Result<PathBuf, StagingError> {
        let dir = self.root.join(&record.source);
        fs::create_dir_all(&dir).map_err(|e| StagingError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let name = format!(
            "{}_{}_{:08x}.json",
            record.source,
            chrono::Utc::now().timestamp(),
            rand::random::<u32>()
        );
        let path = dir.join(name);

        let bytes = serde_json::to_vec(record)?;
        fs::write(&path, bytes).map_err(|e| StagingError::Io {
            path: path.clone(),
            source: e,
        })?;

        Ok(path)
    }
}

/// Snapshot the JSON files currently present in a staging directory.
///
/// Files appearing mid-enumeration are picked up by a later poll cycle.
/// A missing directory is an empty snapshot, not an error.
pub fn pending_files(staging_dir: &Path) -> Result<Vec<PathBuf>, StagingError> {
    if !staging_dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(staging_dir).map_err(|e| StagingError::Io {
        path: staging_dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StagingError::Io {
            path: staging_dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    Ok(files)
}

/// Move a consumed raw file into the archive directory, preserving its name.
///
/// This is the sole commit signal for a record; it must only be called after
/// the record is durably reflected in a partition batch file.
pub fn archive_file(file: &Path, archive_dir: &Path) -> Result<PathBuf, StagingError> {
    fs::create_dir_all(archive_dir).map_err(|e| StagingError::Io {
        path: archive_dir.to_path_buf(),
        source: e,
    })?;

    let name = file.file_name().unwrap_or_default();
    let dest = archive_dir.join(name);
    fs::rename(file, &dest).map_err(|e| StagingError::Io {
        path: file.to_path_buf(),
        source: e,
    })?;
    Ok(dest)
}
