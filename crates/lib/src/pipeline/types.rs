//! Pipeline unit definition types.
//!
//! A pipeline is an ordered list of stages, each an ordered list of actions.
//! Stages execute strictly in declared order on provider infrastructure;
//! within a stage, actions carrying a numeric `run_order` execute in
//! ascending order, each waiting for all lower-numbered actions to finish.
//! Actions pass data through named artifacts: produced by exactly one action,
//! consumed by actions in strictly later stages.
//!
//! The canonical shape is the three-stage sequence built by
//! [`PipelineDef::three_stage`]: fetch source, build, then deploy-and-
//! invalidate. The cache invalidation always runs after the bucket copy of
//! the same stage; invalidating first would serve stale content between
//! cache expiry and the new content landing in the origin.

use serde::{Deserialize, Serialize};

use crate::consts::{BUILD_ARTIFACT, SOURCE_ARTIFACT};
use crate::hosting::handle_placeholder;
use crate::util::hash::{Hashable, ObjectHash};

/// GitHub source action settings.
///
/// `owner` and `repo` are resolved from the secret store while the config
/// evaluates; `token` is a `$${secret:...}` placeholder so the credential
/// itself never enters the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDef {
  pub owner: String,
  pub repo: String,
  pub branch: String,
  pub token: String,
  /// Secret store entry the credentials were resolved from.
  pub entry: String,
}

/// Artifact contract of the build step: which directory to capture and which
/// files inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
  pub base_dir: String,
  pub files: Vec<String>,
}

impl Default for ArtifactSpec {
  fn default() -> Self {
    Self {
      base_dir: "build".to_string(),
      files: vec!["**/*".to_string()],
    }
  }
}

/// Build project settings: install then build, inside an isolated image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProjectDef {
  pub install_commands: Vec<String>,
  pub build_commands: Vec<String>,
  pub image: String,
  pub artifact: ArtifactSpec,
}

impl Default for BuildProjectDef {
  fn default() -> Self {
    Self {
      install_commands: vec!["npm i".to_string()],
      build_commands: vec!["npm run build".to_string()],
      image: "aws/codebuild/standard:7.0".to_string(),
      artifact: ArtifactSpec::default(),
    }
  }
}

/// Copy an artifact's contents into a hosting bucket, overwriting existing
/// content wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployDef {
  /// Handle placeholder of the target bucket.
  pub bucket: String,
  pub extract: bool,
}

/// Flush cached copies from a hosting distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateDef {
  /// Handle placeholder of the distribution.
  pub distribution: String,
  pub paths: Vec<String>,
}

/// What an action does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
  Source(SourceDef),
  Build(BuildProjectDef),
  Deploy(DeployDef),
  Invalidate(InvalidateDef),
}

/// A unit of work within a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDef {
  pub name: String,
  /// Relative order within the stage. Actions without one run at order 1.
  pub run_order: Option<u32>,
  /// Artifact consumed by this action.
  pub input: Option<String>,
  /// Artifacts produced by this action.
  pub outputs: Vec<String>,
  pub kind: ActionKind,
}

impl ActionDef {
  /// The run order the provider will use: explicit value, or 1.
  pub fn effective_run_order(&self) -> u32 {
    self.run_order.unwrap_or(1)
  }
}

/// A named, strictly-ordered phase of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDef {
  pub name: String,
  pub actions: Vec<ActionDef>,
}

/// A complete pipeline unit definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
  pub id: String,
  /// Hash of the hosting unit whose handles this pipeline consumes.
  pub hosting: ObjectHash,
  /// Restart an in-flight execution when the pipeline itself is updated.
  pub restart_on_update: bool,
  pub stages: Vec<StageDef>,
}

impl Hashable for PipelineDef {}

impl PipelineDef {
  /// Wire the canonical three-stage sequence against a hosting unit.
  ///
  /// Stage 1 fetches source (producing `source`), stage 2 builds (consuming
  /// `source`, producing `build`), stage 3 copies `build` into the bucket at
  /// run order 1 and invalidates the distribution at run order 2.
  pub fn three_stage(
    id: String,
    hosting: ObjectHash,
    source: SourceDef,
    build: BuildProjectDef,
    restart_on_update: bool,
  ) -> Self {
    let bucket = handle_placeholder(&hosting, "bucket");
    let distribution = handle_placeholder(&hosting, "distribution");

    let stages = vec![
      StageDef {
        name: "Source".to_string(),
        actions: vec![ActionDef {
          name: "github-source".to_string(),
          run_order: None,
          input: None,
          outputs: vec![SOURCE_ARTIFACT.to_string()],
          kind: ActionKind::Source(source),
        }],
      },
      StageDef {
        name: "Build".to_string(),
        actions: vec![ActionDef {
          name: "app-build".to_string(),
          run_order: None,
          input: Some(SOURCE_ARTIFACT.to_string()),
          outputs: vec![BUILD_ARTIFACT.to_string()],
          kind: ActionKind::Build(build),
        }],
      },
      StageDef {
        name: "Deploy".to_string(),
        actions: vec![
          ActionDef {
            name: "deploy-to-bucket".to_string(),
            run_order: Some(1),
            input: Some(BUILD_ARTIFACT.to_string()),
            outputs: vec![],
            kind: ActionKind::Deploy(DeployDef { bucket, extract: true }),
          },
          ActionDef {
            name: "invalidate-cache".to_string(),
            run_order: Some(2),
            input: Some(BUILD_ARTIFACT.to_string()),
            outputs: vec![],
            kind: ActionKind::Invalidate(InvalidateDef {
              distribution,
              paths: vec!["/*".to_string()],
            }),
          },
        ],
      },
    ];

    Self {
      id,
      hosting,
      restart_on_update,
      stages,
    }
  }
}
