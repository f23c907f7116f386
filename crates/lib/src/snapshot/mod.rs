//! Recorded synth results and manifest diffing.

mod diff;
mod storage;
mod types;

pub use diff::{StateDiff, compute_diff};
pub use storage::SnapshotStore;
pub use types::{SNAPSHOT_INDEX_VERSION, Snapshot, SnapshotError, SnapshotIndex, SnapshotMetadata};
