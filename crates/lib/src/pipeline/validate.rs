//! Definition-time validation of pipeline wiring.
//!
//! Validation runs after evaluation, before anything is synthesized or
//! recorded. It enforces the invariants the provider assumes but does not
//! check for us until a run is already in flight:
//!
//! - stages are non-empty and uniquely named
//! - every artifact has exactly one producer
//! - an artifact is produced in a strictly earlier stage than any consumer
//! - explicit run orders are >= 1
//! - a cache invalidation never runs at or before a bucket copy in the same
//!   stage
//! - handle references point at hosting units present in the manifest

use thiserror::Error;

use crate::manifest::Manifest;
use crate::placeholder::{self, Placeholder, PlaceholderError};
use crate::util::hash::ObjectHash;

use super::{ActionKind, PipelineDef};

/// Errors raised by manifest validation.
#[derive(Debug, Error)]
pub enum ValidateError {
  #[error("pipeline '{id}' has no stages")]
  EmptyPipeline { id: String },

  #[error("pipeline '{id}' stage '{stage}' has no actions")]
  EmptyStage { id: String, stage: String },

  #[error("pipeline '{id}' declares stage '{stage}' more than once")]
  DuplicateStage { id: String, stage: String },

  #[error("pipeline '{id}': artifact '{artifact}' has more than one producer")]
  DuplicateProducer { id: String, artifact: String },

  #[error(
    "pipeline '{id}' stage '{stage}': artifact '{artifact}' is consumed before any earlier stage produces it"
  )]
  ConsumeBeforeProduce {
    id: String,
    stage: String,
    artifact: String,
  },

  #[error("pipeline '{id}' stage '{stage}' action '{action}': run_order must be >= 1")]
  InvalidRunOrder {
    id: String,
    stage: String,
    action: String,
  },

  #[error(
    "pipeline '{id}' stage '{stage}': invalidation '{action}' must run strictly after the deploy action"
  )]
  InvalidationBeforeDeploy {
    id: String,
    stage: String,
    action: String,
  },

  #[error("pipeline '{id}' references unknown hosting unit {hash}")]
  UnknownHosting { id: String, hash: ObjectHash },

  #[error("pipeline '{id}' action '{action}': '{value}' is not a hosting handle")]
  NotAHostingHandle {
    id: String,
    action: String,
    value: String,
  },

  #[error("pipeline '{id}' action '{action}': bad handle reference: {source}")]
  BadHandle {
    id: String,
    action: String,
    source: PlaceholderError,
  },
}

/// Validate every pipeline in a manifest.
pub fn validate_manifest(manifest: &Manifest) -> Result<(), ValidateError> {
  for def in manifest.pipelines.values() {
    validate_pipeline(def)?;
    validate_handles(def, manifest)?;
  }
  Ok(())
}

/// Validate a single pipeline's internal wiring.
pub fn validate_pipeline(def: &PipelineDef) -> Result<(), ValidateError> {
  if def.stages.is_empty() {
    return Err(ValidateError::EmptyPipeline { id: def.id.clone() });
  }

  let mut seen_stages = std::collections::BTreeSet::new();
  // Artifacts produced by stages strictly before the one being checked.
  let mut available = std::collections::BTreeSet::new();
  let mut produced = std::collections::BTreeSet::new();

  for stage in &def.stages {
    if !seen_stages.insert(stage.name.as_str()) {
      return Err(ValidateError::DuplicateStage {
        id: def.id.clone(),
        stage: stage.name.clone(),
      });
    }

    if stage.actions.is_empty() {
      return Err(ValidateError::EmptyStage {
        id: def.id.clone(),
        stage: stage.name.clone(),
      });
    }

    for action in &stage.actions {
      if action.run_order == Some(0) {
        return Err(ValidateError::InvalidRunOrder {
          id: def.id.clone(),
          stage: stage.name.clone(),
          action: action.name.clone(),
        });
      }

      if let Some(input) = &action.input
        && !available.contains(input.as_str())
      {
        return Err(ValidateError::ConsumeBeforeProduce {
          id: def.id.clone(),
          stage: stage.name.clone(),
          artifact: input.clone(),
        });
      }

      for output in &action.outputs {
        if !produced.insert(output.clone()) {
          return Err(ValidateError::DuplicateProducer {
            id: def.id.clone(),
            artifact: output.clone(),
          });
        }
      }
    }

    validate_invalidation_order(def, stage)?;

    // This stage's outputs become available to later stages only.
    for action in &stage.actions {
      for output in &action.outputs {
        available.insert(output.clone());
      }
    }
  }

  Ok(())
}

/// Within one stage, every invalidation must carry a strictly greater run
/// order than every deploy. Relying on stage-boundary ordering alone is not
/// enough: a flush racing the copy would repopulate the cache from stale
/// origin content.
fn validate_invalidation_order(
  def: &PipelineDef,
  stage: &super::StageDef,
) -> Result<(), ValidateError> {
  let deploy_orders: Vec<u32> = stage
    .actions
    .iter()
    .filter(|a| matches!(a.kind, ActionKind::Deploy(_)))
    .map(|a| a.effective_run_order())
    .collect();

  if deploy_orders.is_empty() {
    return Ok(());
  }

  for action in &stage.actions {
    if matches!(action.kind, ActionKind::Invalidate(_)) {
      let order = action.effective_run_order();
      if deploy_orders.iter().any(|deploy| order <= *deploy) {
        return Err(ValidateError::InvalidationBeforeDeploy {
          id: def.id.clone(),
          stage: stage.name.clone(),
          action: action.name.clone(),
        });
      }
    }
  }

  Ok(())
}

/// Check that the pipeline's hosting reference and every handle placeholder
/// in its actions resolve to hosting units present in the manifest.
fn validate_handles(def: &PipelineDef, manifest: &Manifest) -> Result<(), ValidateError> {
  if !manifest.hostings.contains_key(&def.hosting) {
    return Err(ValidateError::UnknownHosting {
      id: def.id.clone(),
      hash: def.hosting.clone(),
    });
  }

  for stage in &def.stages {
    for action in &stage.actions {
      let handle = match &action.kind {
        ActionKind::Deploy(deploy) => Some(&deploy.bucket),
        ActionKind::Invalidate(invalidate) => Some(&invalidate.distribution),
        _ => None,
      };

      let Some(value) = handle else { continue };

      let parsed = placeholder::parse_single(value).map_err(|e| ValidateError::BadHandle {
        id: def.id.clone(),
        action: action.name.clone(),
        source: e,
      })?;

      match parsed {
        Some(Placeholder::Hosting { hash, .. }) => {
          let hash = ObjectHash(hash);
          if !manifest.hostings.contains_key(&hash) {
            return Err(ValidateError::UnknownHosting {
              id: def.id.clone(),
              hash,
            });
          }
        }
        _ => {
          return Err(ValidateError::NotAHostingHandle {
            id: def.id.clone(),
            action: action.name.clone(),
            value: value.clone(),
          });
        }
      }
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::hosting::{BucketDef, DistributionDef, HostingDef};
  use crate::pipeline::{ActionDef, BuildProjectDef, SourceDef, StageDef};
  use crate::util::hash::Hashable;

  fn sample_source() -> SourceDef {
    SourceDef {
      owner: "acme".to_string(),
      repo: "webapp".to_string(),
      branch: "main".to_string(),
      token: "$${secret:deploy/github:GITHUB_TOKEN}".to_string(),
      entry: "deploy/github".to_string(),
    }
  }

  fn manifest_with_pipeline() -> (Manifest, PipelineDef) {
    let hosting = HostingDef {
      id: "webapp".to_string(),
      bucket: BucketDef::default(),
      distribution: DistributionDef::default(),
      sync: None,
    };
    let hosting_hash = hosting.compute_hash().unwrap();

    let pipeline = PipelineDef::three_stage(
      "webapp-deploy".to_string(),
      hosting_hash.clone(),
      sample_source(),
      BuildProjectDef::default(),
      true,
    );
    let pipeline_hash = pipeline.compute_hash().unwrap();

    let mut manifest = Manifest::default();
    manifest.hostings.insert(hosting_hash, hosting);
    manifest.pipelines.insert(pipeline_hash, pipeline.clone());

    (manifest, pipeline)
  }

  #[test]
  fn canonical_pipeline_is_valid() {
    let (manifest, _) = manifest_with_pipeline();
    validate_manifest(&manifest).unwrap();
  }

  #[test]
  fn empty_pipeline_is_rejected() {
    let (_, mut pipeline) = manifest_with_pipeline();
    pipeline.stages.clear();

    let err = validate_pipeline(&pipeline).unwrap_err();
    assert!(matches!(err, ValidateError::EmptyPipeline { .. }));
  }

  #[test]
  fn duplicate_stage_name_is_rejected() {
    let (_, mut pipeline) = manifest_with_pipeline();
    let mut dup = pipeline.stages[1].clone();
    // Keep the artifact wiring legal; only the name collides.
    dup.actions[0].outputs = vec!["build2".to_string()];
    dup.name = "Source".to_string();
    pipeline.stages.push(dup);

    let err = validate_pipeline(&pipeline).unwrap_err();
    assert!(matches!(err, ValidateError::DuplicateStage { ref stage, .. } if stage == "Source"));
  }

  #[test]
  fn consume_before_produce_is_rejected() {
    let (_, mut pipeline) = manifest_with_pipeline();
    // Swap Source and Build: Build now consumes `source` before it exists.
    pipeline.stages.swap(0, 1);

    let err = validate_pipeline(&pipeline).unwrap_err();
    assert!(
      matches!(err, ValidateError::ConsumeBeforeProduce { ref artifact, .. } if artifact == "source")
    );
  }

  #[test]
  fn same_stage_consumption_is_rejected() {
    // An artifact is only available to strictly later stages; producing and
    // consuming within one stage would race.
    let (_, mut pipeline) = manifest_with_pipeline();
    let build_action = pipeline.stages[1].actions[0].clone();
    pipeline.stages[0].actions.push(build_action);
    pipeline.stages.remove(1);

    let err = validate_pipeline(&pipeline).unwrap_err();
    assert!(matches!(err, ValidateError::ConsumeBeforeProduce { .. }));
  }

  #[test]
  fn duplicate_producer_is_rejected() {
    let (_, mut pipeline) = manifest_with_pipeline();
    pipeline.stages[1].actions[0].outputs = vec!["source".to_string()];

    let err = validate_pipeline(&pipeline).unwrap_err();
    assert!(
      matches!(err, ValidateError::DuplicateProducer { ref artifact, .. } if artifact == "source")
    );
  }

  #[test]
  fn zero_run_order_is_rejected() {
    let (_, mut pipeline) = manifest_with_pipeline();
    pipeline.stages[2].actions[0].run_order = Some(0);

    let err = validate_pipeline(&pipeline).unwrap_err();
    assert!(matches!(err, ValidateError::InvalidRunOrder { .. }));
  }

  #[test]
  fn invalidation_at_same_run_order_as_deploy_is_rejected() {
    let (_, mut pipeline) = manifest_with_pipeline();
    pipeline.stages[2].actions[1].run_order = Some(1);

    let err = validate_pipeline(&pipeline).unwrap_err();
    assert!(matches!(err, ValidateError::InvalidationBeforeDeploy { .. }));
  }

  #[test]
  fn invalidation_before_deploy_is_rejected() {
    let (_, mut pipeline) = manifest_with_pipeline();
    pipeline.stages[2].actions[0].run_order = Some(2);
    pipeline.stages[2].actions[1].run_order = Some(1);

    let err = validate_pipeline(&pipeline).unwrap_err();
    assert!(matches!(err, ValidateError::InvalidationBeforeDeploy { .. }));
  }

  #[test]
  fn implicit_run_order_counts_as_one() {
    // An invalidation without an explicit run order defaults to 1, tying the
    // deploy action; that still violates the ordering rule.
    let (_, mut pipeline) = manifest_with_pipeline();
    pipeline.stages[2].actions[1].run_order = None;

    let err = validate_pipeline(&pipeline).unwrap_err();
    assert!(matches!(err, ValidateError::InvalidationBeforeDeploy { .. }));
  }

  #[test]
  fn invalidation_alone_in_a_stage_is_fine() {
    let (_, mut pipeline) = manifest_with_pipeline();
    let invalidate = pipeline.stages[2].actions.remove(1);
    pipeline.stages.push(StageDef {
      name: "Flush".to_string(),
      actions: vec![ActionDef {
        run_order: None,
        ..invalidate
      }],
    });

    validate_pipeline(&pipeline).unwrap();
  }

  #[test]
  fn unknown_hosting_reference_is_rejected() {
    let (mut manifest, _pipeline) = manifest_with_pipeline();
    manifest.hostings.clear();

    let err = validate_manifest(&manifest).unwrap_err();
    assert!(matches!(err, ValidateError::UnknownHosting { .. }));
  }

  #[test]
  fn deploy_target_must_be_a_hosting_handle() {
    let (mut manifest, mut pipeline) = manifest_with_pipeline();
    let old_hash = pipeline.compute_hash().unwrap();
    if let crate::pipeline::ActionKind::Deploy(deploy) = &mut pipeline.stages[2].actions[0].kind {
      deploy.bucket = "just-a-bucket-name".to_string();
    }
    manifest.pipelines.remove(&old_hash);
    manifest
      .pipelines
      .insert(pipeline.compute_hash().unwrap(), pipeline);

    let err = validate_manifest(&manifest).unwrap_err();
    assert!(matches!(err, ValidateError::NotAHostingHandle { .. }));
  }

  #[test]
  fn deploy_target_must_reference_existing_hosting() {
    let (mut manifest, mut pipeline) = manifest_with_pipeline();
    let old_hash = pipeline.compute_hash().unwrap();
    if let crate::pipeline::ActionKind::Deploy(deploy) = &mut pipeline.stages[2].actions[0].kind {
      deploy.bucket = "$${hosting:ffffffffffffffffffff:bucket}".to_string();
    }
    manifest.pipelines.remove(&old_hash);
    manifest
      .pipelines
      .insert(pipeline.compute_hash().unwrap(), pipeline);

    let err = validate_manifest(&manifest).unwrap_err();
    assert!(matches!(err, ValidateError::UnknownHosting { .. }));
  }
}
