//! Implementation of the `stack plan` command.
//!
//! Evaluates the config and diffs the result against the current snapshot
//! without writing any state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use stacklua_lib::manifest::Manifest;
use stacklua_lib::paths::snapshots_dir;
use stacklua_lib::snapshot::{SnapshotStore, StateDiff, compute_diff};
use stacklua_lib::util::hash::ObjectHash;

use crate::output::{print_add, print_info, print_json, print_remove, print_unchanged, truncate_hash};

pub fn cmd_plan(config: &Path, secrets: Option<PathBuf>, json: bool) -> Result<()> {
  let desired = super::evaluate(config, secrets)?;

  let store = SnapshotStore::new(snapshots_dir(super::config_dir(config)));
  let current = store.load_current().context("failed to load current snapshot")?;
  let current_manifest = current.as_ref().map(|s| &s.manifest);

  let diff = compute_diff(&desired, current_manifest);

  if json {
    return print_json(&diff);
  }

  if diff.is_empty() {
    print_info("no changes; deployment matches the last recorded synth");
    return Ok(());
  }

  print_diff(&diff, &desired, current_manifest);

  println!();
  print_info(&format!("{} change(s); run `stack synth` to record", diff.change_count()));

  Ok(())
}

/// Print one line per unit, labeled from whichever manifest knows the unit.
pub(crate) fn print_diff(diff: &StateDiff, desired: &Manifest, current: Option<&Manifest>) {
  for hash in &diff.hostings_to_create {
    print_add(&unit_label("hosting", hash, hosting_id(desired, hash)));
  }
  for hash in &diff.hostings_to_remove {
    print_remove(&unit_label("hosting", hash, current.and_then(|m| hosting_id(m, hash))));
  }
  for hash in &diff.hostings_unchanged {
    print_unchanged(&unit_label("hosting", hash, hosting_id(desired, hash)));
  }

  for hash in &diff.pipelines_to_create {
    print_add(&unit_label("pipeline", hash, pipeline_id(desired, hash)));
  }
  for hash in &diff.pipelines_to_remove {
    print_remove(&unit_label("pipeline", hash, current.and_then(|m| pipeline_id(m, hash))));
  }
  for hash in &diff.pipelines_unchanged {
    print_unchanged(&unit_label("pipeline", hash, pipeline_id(desired, hash)));
  }
}

fn hosting_id<'a>(manifest: &'a Manifest, hash: &ObjectHash) -> Option<&'a str> {
  manifest.hostings.get(hash).map(|d| d.id.as_str())
}

fn pipeline_id<'a>(manifest: &'a Manifest, hash: &ObjectHash) -> Option<&'a str> {
  manifest.pipelines.get(hash).map(|d| d.id.as_str())
}

fn unit_label(kind: &str, hash: &ObjectHash, id: Option<&str>) -> String {
  format!("{} {} ({})", kind, id.unwrap_or("?"), truncate_hash(&hash.0))
}
