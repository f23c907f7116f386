//! Manifest types representing a desired deployment.
//!
//! The manifest is the intermediate representation produced by evaluating a
//! Lua config. Both unit maps are content-addressed: keys are hashes over the
//! JSON-serialized definitions, which deduplicates identical units, makes
//! equality checks cheap, and lets plan/diff classify changes by set
//! difference. [`BTreeMap`] keeps serialization order deterministic so the
//! manifest hash itself is reproducible.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hosting::HostingDef;
use crate::pipeline::PipelineDef;
use crate::util::hash::{Hashable, ObjectHash};

/// The complete desired deployment.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
  /// All hosting units, keyed by their content hash.
  pub hostings: BTreeMap<ObjectHash, HostingDef>,
  /// All pipeline units, keyed by their content hash.
  pub pipelines: BTreeMap<ObjectHash, PipelineDef>,
}

impl Hashable for Manifest {}

impl Manifest {
  /// Total number of units in the manifest.
  pub fn unit_count(&self) -> usize {
    self.hostings.len() + self.pipelines.len()
  }

  /// Look up a hosting unit by hash.
  pub fn hosting(&self, hash: &ObjectHash) -> Option<&HostingDef> {
    self.hostings.get(hash)
  }
}
