//! Snapshot Persistence Module
//!
//! Reads and writes the on-disk cache snapshot: a format version tag, the
//! entry map and the metrics. Best-effort only, this is not a journal.

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::cache::{CacheEntry, CacheMetrics};
use crate::error::{CacheError, Result};

/// Snapshot format version written by this crate
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Snapshot file name inside the cache directory
pub const SNAPSHOT_FILE_NAME: &str = "cache.json";

// == Cache Snapshot ==
/// Persisted form of a cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub entries: HashMap<String, CacheEntry>,
    pub metrics: CacheMetrics,
}

impl CacheSnapshot {
    pub fn new(entries: HashMap<String, CacheEntry>, metrics: CacheMetrics) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            created_at: Utc::now(),
            entries,
            metrics,
        }
    }
}

/// Rejects empty paths and paths that climb with `..`.
pub fn check_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(CacheError::InvalidArgument(
            "snapshot path must not be empty".to_string(),
        ));
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(CacheError::InvalidArgument(format!(
            "snapshot path {} must not contain '..'",
            path.display()
        )));
    }
    Ok(())
}

// == Write ==
/// Writes `snapshot` to `path`.
///
/// The data goes to a uniquely named temp file in the same directory and is
/// renamed into place once synced. Leftovers from a crashed writer never
/// block later writes.
pub fn write_snapshot(path: &Path, snapshot: &CacheSnapshot) -> Result<()> {
    check_path(path)?;
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)
                .map_err(|e| CacheError::io(&format!("create {}", parent.display()), e))?;
            parent
        }
        None => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|e| CacheError::io(&format!("create temp file in {}", parent.display()), e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, snapshot)?;
        writer
            .flush()
            .map_err(|e| CacheError::io(&format!("flush {}", path.display()), e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| CacheError::io(&format!("sync {}", path.display()), e))?;
    tmp.persist(path)
        .map_err(|e| CacheError::io(&format!("rename to {}", path.display()), e.error))?;

    debug!(path = %path.display(), entries = snapshot.entries.len(), "Snapshot written");
    Ok(())
}

// == Read ==
/// Reads a snapshot from `path`, rejecting unknown format versions.
pub fn read_snapshot(path: &Path) -> Result<CacheSnapshot> {
    check_path(path)?;
    let bytes =
        fs::read(path).map_err(|e| CacheError::io(&format!("read {}", path.display()), e))?;
    let snapshot: CacheSnapshot = serde_json::from_slice(&bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CacheError::Corruption(format!(
            "unsupported snapshot version '{}' in {}",
            snapshot.version,
            path.display()
        )));
    }
    Ok(snapshot)
}
