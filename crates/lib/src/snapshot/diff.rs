//! Diff computation between manifests.
//!
//! Units are content-addressed, so the diff is plain set difference over
//! hashes: a modified definition shows up as one removal plus one creation.

use std::collections::HashSet;

use crate::manifest::Manifest;
use crate::util::hash::ObjectHash;

/// Diff between a desired manifest and the currently recorded one.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize)]
pub struct StateDiff {
  /// Hosting units in desired, not in current.
  pub hostings_to_create: Vec<ObjectHash>,
  /// Hosting units in current, not in desired.
  pub hostings_to_remove: Vec<ObjectHash>,
  /// Hosting units present in both (same hash).
  pub hostings_unchanged: Vec<ObjectHash>,

  /// Pipeline units in desired, not in current.
  pub pipelines_to_create: Vec<ObjectHash>,
  /// Pipeline units in current, not in desired.
  pub pipelines_to_remove: Vec<ObjectHash>,
  /// Pipeline units present in both (same hash).
  pub pipelines_unchanged: Vec<ObjectHash>,
}

impl StateDiff {
  /// True when desired and current describe the same deployment.
  pub fn is_empty(&self) -> bool {
    self.hostings_to_create.is_empty()
      && self.hostings_to_remove.is_empty()
      && self.pipelines_to_create.is_empty()
      && self.pipelines_to_remove.is_empty()
  }

  /// Number of changes (creations plus removals).
  pub fn change_count(&self) -> usize {
    self.hostings_to_create.len()
      + self.hostings_to_remove.len()
      + self.pipelines_to_create.len()
      + self.pipelines_to_remove.len()
  }
}

/// Compute the diff between a desired manifest and the current state.
///
/// `current` is `None` before the first recorded synth; everything desired is
/// then a creation.
pub fn compute_diff(desired: &Manifest, current: Option<&Manifest>) -> StateDiff {
  let mut diff = StateDiff::default();

  diff_keys(
    desired.hostings.keys(),
    current.map(|m| m.hostings.keys()),
    &mut diff.hostings_to_create,
    &mut diff.hostings_to_remove,
    &mut diff.hostings_unchanged,
  );

  diff_keys(
    desired.pipelines.keys(),
    current.map(|m| m.pipelines.keys()),
    &mut diff.pipelines_to_create,
    &mut diff.pipelines_to_remove,
    &mut diff.pipelines_unchanged,
  );

  diff
}

fn diff_keys<'a>(
  desired: impl Iterator<Item = &'a ObjectHash>,
  current: Option<impl Iterator<Item = &'a ObjectHash>>,
  to_create: &mut Vec<ObjectHash>,
  to_remove: &mut Vec<ObjectHash>,
  unchanged: &mut Vec<ObjectHash>,
) {
  let desired: HashSet<&ObjectHash> = desired.collect();
  let current: HashSet<&ObjectHash> = current.map(|keys| keys.collect()).unwrap_or_default();

  for hash in desired.difference(&current) {
    to_create.push((*hash).clone());
  }
  for hash in current.difference(&desired) {
    to_remove.push((*hash).clone());
  }
  for hash in desired.intersection(&current) {
    unchanged.push((*hash).clone());
  }

  // Set iteration order is arbitrary; sort for stable output.
  to_create.sort();
  to_remove.sort();
  unchanged.sort();
}
