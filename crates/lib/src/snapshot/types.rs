//! Snapshot data types.
//!
//! A snapshot records the manifest a `synth` produced, so later invocations
//! can classify changes (`plan`) and compare recorded states (`diff`).

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::manifest::Manifest;
use crate::util::hash::Hashable;

/// Current snapshot index format version.
pub const SNAPSHOT_INDEX_VERSION: u32 = 1;

/// Errors raised by snapshot storage.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
  #[error("failed to create snapshot directory: {0}")]
  CreateDir(std::io::Error),

  #[error("failed to read snapshot data: {0}")]
  Read(std::io::Error),

  #[error("failed to write snapshot data: {0}")]
  Write(std::io::Error),

  #[error("failed to parse snapshot data: {0}")]
  Parse(serde_json::Error),

  #[error("failed to serialize snapshot data: {0}")]
  Serialize(serde_json::Error),

  #[error("snapshot not found: {0}")]
  NotFound(String),

  #[error("unsupported snapshot index version: {0}")]
  UnsupportedVersion(u32),
}

/// A recorded synth result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub id: String,
  /// Seconds since the Unix epoch.
  pub created_at: u64,
  pub config_path: Option<PathBuf>,
  pub manifest: Manifest,
}

impl Snapshot {
  /// Create a snapshot for a manifest.
  ///
  /// The id is the manifest's content hash, so a re-synth of an unchanged
  /// config resolves to the same snapshot instead of accumulating duplicates.
  pub fn new(manifest: Manifest, config_path: Option<PathBuf>) -> Result<Self, SnapshotError> {
    let created_at = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs())
      .unwrap_or(0);

    let manifest_hash = manifest.compute_hash().map_err(SnapshotError::Serialize)?;

    Ok(Self {
      id: manifest_hash.0,
      created_at,
      config_path,
      manifest,
    })
  }

  pub fn to_metadata(&self) -> SnapshotMetadata {
    SnapshotMetadata {
      id: self.id.clone(),
      created_at: self.created_at,
    }
  }
}

/// Per-snapshot entry in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
  pub id: String,
  pub created_at: u64,
}

/// The snapshot index: list plus current pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotIndex {
  pub version: u32,
  pub current: Option<String>,
  pub snapshots: Vec<SnapshotMetadata>,
}

impl SnapshotIndex {
  pub fn new() -> Self {
    Self {
      version: SNAPSHOT_INDEX_VERSION,
      current: None,
      snapshots: Vec::new(),
    }
  }

  /// Add a snapshot entry, replacing an existing entry with the same id.
  pub fn add(&mut self, metadata: SnapshotMetadata) {
    self.snapshots.retain(|s| s.id != metadata.id);
    self.snapshots.push(metadata);
  }
}

impl Default for SnapshotIndex {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn snapshot_id_is_the_manifest_hash() {
    let manifest = Manifest::default();
    let snapshot = Snapshot::new(manifest.clone(), None).unwrap();

    let hash = manifest.compute_hash().unwrap();
    assert_eq!(snapshot.id, hash.0);
  }

  #[test]
  fn index_add_replaces_same_id() {
    let mut index = SnapshotIndex::new();
    index.add(SnapshotMetadata {
      id: "a".to_string(),
      created_at: 1,
    });
    index.add(SnapshotMetadata {
      id: "a".to_string(),
      created_at: 2,
    });

    assert_eq!(index.snapshots.len(), 1);
    assert_eq!(index.snapshots[0].created_at, 2);
  }
}
