//! Snapshot storage.
//!
//! # Storage layout
//!
//! ```text
//! {state_dir}/snapshots/
//! ├── index.json          # SnapshotIndex: list + current pointer
//! └── <id>.json           # Individual Snapshot files
//! ```
//!
//! Writes go through a temp file plus rename so a crash mid-write never
//! leaves a truncated index or snapshot behind.

use std::fs;
use std::io;
use std::path::PathBuf;

use super::types::{SNAPSHOT_INDEX_VERSION, Snapshot, SnapshotError, SnapshotIndex, SnapshotMetadata};

const INDEX_FILENAME: &str = "index.json";

/// Manages snapshot storage on disk.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
  base_path: PathBuf,
}

impl SnapshotStore {
  /// Create a snapshot store at the given base path.
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  pub fn base_path(&self) -> &PathBuf {
    &self.base_path
  }

  fn index_path(&self) -> PathBuf {
    self.base_path.join(INDEX_FILENAME)
  }

  fn snapshot_path(&self, id: &str) -> PathBuf {
    self.base_path.join(format!("{}.json", id))
  }

  fn ensure_dir(&self) -> Result<(), SnapshotError> {
    fs::create_dir_all(&self.base_path).map_err(SnapshotError::CreateDir)
  }

  /// Load the snapshot index, or an empty index if none exists yet.
  pub fn load_index(&self) -> Result<SnapshotIndex, SnapshotError> {
    let path = self.index_path();

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SnapshotIndex::new()),
      Err(e) => return Err(SnapshotError::Read(e)),
    };

    let index: SnapshotIndex = serde_json::from_str(&content).map_err(SnapshotError::Parse)?;

    if index.version != SNAPSHOT_INDEX_VERSION {
      return Err(SnapshotError::UnsupportedVersion(index.version));
    }

    Ok(index)
  }

  fn save_index(&self, index: &SnapshotIndex) -> Result<(), SnapshotError> {
    self.ensure_dir()?;

    let path = self.index_path();
    let temp_path = self.base_path.join("index.json.tmp");

    let content = serde_json::to_string_pretty(index).map_err(SnapshotError::Serialize)?;
    fs::write(&temp_path, &content).map_err(SnapshotError::Write)?;
    fs::rename(&temp_path, &path).map_err(SnapshotError::Write)?;

    Ok(())
  }

  /// Load the current snapshot, or `None` if nothing has been recorded yet.
  pub fn load_current(&self) -> Result<Option<Snapshot>, SnapshotError> {
    let index = self.load_index()?;
    match index.current {
      Some(id) => Ok(Some(self.load_snapshot(&id)?)),
      None => Ok(None),
    }
  }

  /// Load a snapshot by id.
  pub fn load_snapshot(&self, id: &str) -> Result<Snapshot, SnapshotError> {
    let path = self.snapshot_path(id);

    let content = fs::read_to_string(&path).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        SnapshotError::NotFound(id.to_string())
      } else {
        SnapshotError::Read(e)
      }
    })?;

    let snapshot: Snapshot = serde_json::from_str(&content).map_err(SnapshotError::Parse)?;
    Ok(snapshot)
  }

  /// Save a snapshot and set it as current.
  pub fn save_and_set_current(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    self.ensure_dir()?;

    let path = self.snapshot_path(&snapshot.id);
    let temp_path = self.base_path.join(format!("{}.json.tmp", snapshot.id));

    let content = serde_json::to_string_pretty(snapshot).map_err(SnapshotError::Serialize)?;
    fs::write(&temp_path, &content).map_err(SnapshotError::Write)?;
    fs::rename(&temp_path, &path).map_err(SnapshotError::Write)?;

    let mut index = self.load_index()?;
    index.add(snapshot.to_metadata());
    index.current = Some(snapshot.id.clone());
    self.save_index(&index)?;

    Ok(())
  }

  /// List all snapshots in recorded order (oldest first).
  pub fn list(&self) -> Result<Vec<SnapshotMetadata>, SnapshotError> {
    let index = self.load_index()?;
    Ok(index.snapshots)
  }
}
