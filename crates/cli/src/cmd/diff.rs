//! Implementation of the `stack diff` command.
//!
//! Compares two recorded snapshots. With no arguments, compares the previous
//! snapshot against the current one.

use std::path::Path;

use anyhow::{Context, Result, bail};

use stacklua_lib::paths::snapshots_dir;
use stacklua_lib::snapshot::{Snapshot, SnapshotStore, compute_diff};

use crate::output::{print_info, print_json};

pub fn cmd_diff(
  config: &Path,
  snapshot_a: Option<String>,
  snapshot_b: Option<String>,
  json: bool,
) -> Result<()> {
  let store = SnapshotStore::new(snapshots_dir(super::config_dir(config)));

  let (snap_a, snap_b) = load_snapshots_to_compare(&store, snapshot_a, snapshot_b)?;

  let diff = compute_diff(&snap_b.manifest, Some(&snap_a.manifest));

  if json {
    return print_json(&serde_json::json!({
      "snapshot_a": snap_a.id,
      "snapshot_b": snap_b.id,
      "diff": diff,
    }));
  }

  println!("Comparing {} -> {}", snap_a.id, snap_b.id);
  println!();

  if diff.is_empty() {
    print_info("no changes between the snapshots");
    return Ok(());
  }

  super::plan::print_diff(&diff, &snap_b.manifest, Some(&snap_a.manifest));
  println!();
  print_info(&format!("{} change(s)", diff.change_count()));

  Ok(())
}

fn load_snapshots_to_compare(
  store: &SnapshotStore,
  snapshot_a: Option<String>,
  snapshot_b: Option<String>,
) -> Result<(Snapshot, Snapshot)> {
  match (snapshot_a, snapshot_b) {
    (Some(a), Some(b)) => {
      let snap_a = store
        .load_snapshot(&a)
        .with_context(|| format!("failed to load snapshot: {}", a))?;
      let snap_b = store
        .load_snapshot(&b)
        .with_context(|| format!("failed to load snapshot: {}", b))?;
      Ok((snap_a, snap_b))
    }
    (None, None) => {
      let index = store.load_index().context("failed to load snapshot index")?;

      if index.snapshots.len() < 2 {
        bail!("not enough snapshots to compare; need at least 2");
      }

      let current = store
        .load_current()
        .context("failed to load current snapshot")?
        .context("no current snapshot set")?;

      let current_idx = index
        .snapshots
        .iter()
        .position(|s| s.id == current.id)
        .context("current snapshot not found in index")?;

      if current_idx == 0 {
        bail!("no previous snapshot to compare to; current is the oldest");
      }

      let prev_id = &index.snapshots[current_idx - 1].id;
      let prev = store
        .load_snapshot(prev_id)
        .with_context(|| format!("failed to load previous snapshot: {}", prev_id))?;

      Ok((prev, current))
    }
    _ => bail!("pass either no snapshot ids (previous -> current) or both"),
  }
}
