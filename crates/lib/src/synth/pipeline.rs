//! Synthesis of pipeline units.
//!
//! A pipeline unit lowers to:
//! - an `AWS::CodeBuild::Project` (plus a logs-only service role) for every
//!   build action
//! - an `AWS::CodeBuild::Project` for every invalidate action, with a role
//!   granted exactly `cloudfront:CreateInvalidation` on the one referenced
//!   distribution
//! - a private artifact-store bucket
//! - the pipeline service role
//! - the `AWS::CodePipeline::Pipeline` itself, with stages and actions in
//!   declared order and explicit `RunOrder` values carried through
//!
//! Handle placeholders in deploy/invalidate actions are resolved against the
//! hosting unit's logical resources; the source token placeholder becomes a
//! Secrets Manager dynamic reference.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::hosting::HostingDef;
use crate::manifest::Manifest;
use crate::pipeline::{ActionDef, ActionKind, BuildProjectDef, PipelineDef, StageDef};
use crate::placeholder::{self, Placeholder, PlaceholderError};
use crate::util::hash::ObjectHash;

use super::{DynamicRefResolver, HostingResources, SynthError, Template, logical_id, pascal_case};

/// Emit all resources and outputs for one pipeline unit.
pub fn synthesize_pipeline(
  template: &mut Template,
  manifest: &Manifest,
  hash: &ObjectHash,
  def: &PipelineDef,
) -> Result<(), SynthError> {
  let artifacts_bucket = logical_id(&def.id, "Artifacts", hash);
  let pipeline_role = logical_id(&def.id, "PipelineRole", hash);
  let pipeline_resource = logical_id(&def.id, "Pipeline", hash);

  // Per-action CodeBuild projects first; the pipeline role and the stage
  // configurations both reference them by logical id.
  let mut projects: BTreeMap<String, String> = BTreeMap::new();
  let mut deploy_buckets: Vec<String> = Vec::new();

  for stage in &def.stages {
    for action in &stage.actions {
      match &action.kind {
        ActionKind::Build(build) => {
          let project_id = synthesize_build_project(template, hash, def, action, build)?;
          projects.insert(action.name.clone(), project_id);
        }
        ActionKind::Invalidate(invalidate) => {
          let hosting = resolve_hosting(manifest, &invalidate.distribution)?;
          let project_id =
            synthesize_invalidate_project(template, hash, def, action, &hosting, &invalidate.paths)?;
          projects.insert(action.name.clone(), project_id);
        }
        ActionKind::Deploy(deploy) => {
          let hosting = resolve_hosting(manifest, &deploy.bucket)?;
          deploy_buckets.push(hosting.bucket);
        }
        ActionKind::Source(_) => {}
      }
    }
  }

  template.add_resource(
    artifacts_bucket.clone(),
    "AWS::S3::Bucket",
    json!({
      "PublicAccessBlockConfiguration": {
        "BlockPublicAcls": true,
        "BlockPublicPolicy": true,
        "IgnorePublicAcls": true,
        "RestrictPublicBuckets": true,
      },
    }),
  )?;

  template.add_resource(
    pipeline_role.clone(),
    "AWS::IAM::Role",
    pipeline_role_properties(&artifacts_bucket, &projects, &deploy_buckets),
  )?;

  let stages = def
    .stages
    .iter()
    .map(|stage| stage_value(manifest, stage, &projects))
    .collect::<Result<Vec<_>, SynthError>>()?;

  template.add_resource(
    pipeline_resource.clone(),
    "AWS::CodePipeline::Pipeline",
    json!({
      "RoleArn": { "Fn::GetAtt": [pipeline_role, "Arn"] },
      "RestartExecutionOnUpdate": def.restart_on_update,
      "ArtifactStore": {
        "Type": "S3",
        "Location": { "Ref": artifacts_bucket },
      },
      "Stages": stages,
    }),
  )?;

  template.add_output(
    format!("{}PipelineName", pascal_case(&def.id)),
    "Name of the deployment pipeline",
    json!({ "Ref": pipeline_resource }),
  );

  Ok(())
}

/// Resolve a handle placeholder to the referenced hosting unit's resources.
fn resolve_hosting(manifest: &Manifest, handle: &str) -> Result<HostingResources, SynthError> {
  let parsed = placeholder::parse_single(handle)?;
  let Some(Placeholder::Hosting { hash, .. }) = parsed else {
    return Err(SynthError::Placeholder(PlaceholderError::Malformed(format!(
      "expected a hosting handle, got '{handle}'"
    ))));
  };

  let hash = ObjectHash(hash);
  let def: &HostingDef = manifest
    .hosting(&hash)
    .ok_or_else(|| SynthError::UnknownHosting(hash.clone()))?;

  Ok(HostingResources::for_unit(&hash, def))
}

/// CodeBuild project for a build action, with a logs-only service role.
fn synthesize_build_project(
  template: &mut Template,
  hash: &ObjectHash,
  def: &PipelineDef,
  action: &ActionDef,
  build: &BuildProjectDef,
) -> Result<String, SynthError> {
  let suffix = pascal_case(&action.name);
  let role_id = logical_id(&def.id, &format!("{suffix}Role"), hash);
  let project_id = logical_id(&def.id, &format!("{suffix}Project"), hash);

  template.add_resource(
    role_id.clone(),
    "AWS::IAM::Role",
    json!({
      "AssumeRolePolicyDocument": assume_role_document("codebuild.amazonaws.com"),
      "Policies": [
        {
          "PolicyName": "logs",
          "PolicyDocument": {
            "Version": "2012-10-17",
            "Statement": [
              {
                "Effect": "Allow",
                "Action": ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
                "Resource": "*",
              }
            ]
          },
        }
      ],
    }),
  )?;

  template.add_resource(
    project_id.clone(),
    "AWS::CodeBuild::Project",
    json!({
      "ServiceRole": { "Fn::GetAtt": [role_id, "Arn"] },
      "Source": {
        "Type": "CODEPIPELINE",
        "BuildSpec": build_spec(build)?,
      },
      "Artifacts": { "Type": "CODEPIPELINE" },
      "Environment": {
        "Type": "LINUX_CONTAINER",
        "ComputeType": "BUILD_GENERAL1_SMALL",
        "Image": build.image,
      },
    }),
  )?;

  Ok(project_id)
}

/// CodeBuild project for an invalidate action.
///
/// The role is granted exactly the invalidation permission, scoped to the one
/// distribution resource; the distribution id reaches the build as an
/// environment variable.
fn synthesize_invalidate_project(
  template: &mut Template,
  hash: &ObjectHash,
  def: &PipelineDef,
  action: &ActionDef,
  hosting: &HostingResources,
  paths: &[String],
) -> Result<String, SynthError> {
  let suffix = pascal_case(&action.name);
  let role_id = logical_id(&def.id, &format!("{suffix}Role"), hash);
  let project_id = logical_id(&def.id, &format!("{suffix}Project"), hash);

  let distribution_arn = format!(
    "arn:aws:cloudfront::${{AWS::AccountId}}:distribution/${{{}}}",
    hosting.distribution
  );

  template.add_resource(
    role_id.clone(),
    "AWS::IAM::Role",
    json!({
      "AssumeRolePolicyDocument": assume_role_document("codebuild.amazonaws.com"),
      "Policies": [
        {
          "PolicyName": "invalidation",
          "PolicyDocument": {
            "Version": "2012-10-17",
            "Statement": [
              {
                "Effect": "Allow",
                "Action": ["cloudfront:CreateInvalidation"],
                "Resource": [{ "Fn::Sub": distribution_arn }],
              }
            ]
          },
        }
      ],
    }),
  )?;

  template.add_resource(
    project_id.clone(),
    "AWS::CodeBuild::Project",
    json!({
      "ServiceRole": { "Fn::GetAtt": [role_id, "Arn"] },
      "Source": {
        "Type": "CODEPIPELINE",
        "BuildSpec": invalidate_spec(paths)?,
      },
      "Artifacts": { "Type": "CODEPIPELINE" },
      "Environment": {
        "Type": "LINUX_CONTAINER",
        "ComputeType": "BUILD_GENERAL1_SMALL",
        "Image": "aws/codebuild/standard:7.0",
        "EnvironmentVariables": [
          {
            "Name": "DISTRIBUTION_ID",
            "Value": { "Ref": hosting.distribution },
          }
        ],
      },
    }),
  )?;

  Ok(project_id)
}

fn assume_role_document(service: &str) -> Value {
  json!({
    "Version": "2012-10-17",
    "Statement": [
      {
        "Effect": "Allow",
        "Principal": { "Service": service },
        "Action": "sts:AssumeRole",
      }
    ]
  })
}

fn pipeline_role_properties(
  artifacts_bucket: &str,
  projects: &BTreeMap<String, String>,
  deploy_buckets: &[String],
) -> Value {
  let mut statements = vec![json!({
    "Effect": "Allow",
    "Action": ["s3:GetObject", "s3:PutObject", "s3:GetBucketVersioning"],
    "Resource": [
      { "Fn::GetAtt": [artifacts_bucket, "Arn"] },
      { "Fn::Sub": format!("${{{artifacts_bucket}.Arn}}/*") },
    ],
  })];

  if !projects.is_empty() {
    let project_arns: Vec<Value> = projects
      .values()
      .map(|p| json!({ "Fn::GetAtt": [p, "Arn"] }))
      .collect();
    statements.push(json!({
      "Effect": "Allow",
      "Action": ["codebuild:StartBuild", "codebuild:BatchGetBuilds"],
      "Resource": project_arns,
    }));
  }

  for bucket in deploy_buckets {
    statements.push(json!({
      "Effect": "Allow",
      "Action": ["s3:PutObject", "s3:DeleteObject", "s3:GetObject", "s3:ListBucket"],
      "Resource": [
        { "Fn::GetAtt": [bucket, "Arn"] },
        { "Fn::Sub": format!("${{{bucket}.Arn}}/*") },
      ],
    }));
  }

  json!({
    "AssumeRolePolicyDocument": assume_role_document("codepipeline.amazonaws.com"),
    "Policies": [
      {
        "PolicyName": "pipeline",
        "PolicyDocument": {
          "Version": "2012-10-17",
          "Statement": statements,
        },
      }
    ],
  })
}

/// Buildspec for a build action: install then build, capturing the declared
/// artifact directory.
fn build_spec(build: &BuildProjectDef) -> Result<String, SynthError> {
  let spec = json!({
    "version": "0.2",
    "phases": {
      "install": { "commands": build.install_commands },
      "build": { "commands": build.build_commands },
    },
    "artifacts": {
      "base-directory": build.artifact.base_dir,
      "files": build.artifact.files,
    },
  });
  Ok(serde_json::to_string(&spec)?)
}

/// Buildspec for an invalidate action.
fn invalidate_spec(paths: &[String]) -> Result<String, SynthError> {
  let quoted: Vec<String> = paths.iter().map(|p| format!("\"{}\"", p)).collect();
  let command = format!(
    "aws cloudfront create-invalidation --distribution-id $DISTRIBUTION_ID --paths {}",
    quoted.join(" ")
  );

  let spec = json!({
    "version": "0.2",
    "phases": {
      "build": { "commands": [command] },
    },
  });
  Ok(serde_json::to_string(&spec)?)
}

/// Lower one stage to its template value, actions in declared order.
fn stage_value(
  manifest: &Manifest,
  stage: &StageDef,
  projects: &BTreeMap<String, String>,
) -> Result<Value, SynthError> {
  let actions = stage
    .actions
    .iter()
    .map(|action| action_value(manifest, action, projects))
    .collect::<Result<Vec<_>, SynthError>>()?;

  Ok(json!({
    "Name": stage.name,
    "Actions": actions,
  }))
}

fn action_value(
  manifest: &Manifest,
  action: &ActionDef,
  projects: &BTreeMap<String, String>,
) -> Result<Value, SynthError> {
  let (type_id, configuration) = match &action.kind {
    ActionKind::Source(source) => (
      json!({
        "Category": "Source",
        "Owner": "ThirdParty",
        "Provider": "GitHub",
        "Version": "1",
      }),
      json!({
        "Owner": source.owner,
        "Repo": source.repo,
        "Branch": source.branch,
        "OAuthToken": placeholder::substitute(&source.token, &DynamicRefResolver)?,
      }),
    ),
    ActionKind::Build(_) | ActionKind::Invalidate(_) => {
      let project = projects.get(&action.name).ok_or_else(|| {
        SynthError::Placeholder(PlaceholderError::Malformed(format!(
          "no project synthesized for action '{}'",
          action.name
        )))
      })?;
      (
        json!({
          "Category": "Build",
          "Owner": "AWS",
          "Provider": "CodeBuild",
          "Version": "1",
        }),
        json!({
          "ProjectName": { "Ref": project },
        }),
      )
    }
    ActionKind::Deploy(deploy) => {
      let hosting = resolve_hosting(manifest, &deploy.bucket)?;
      (
        json!({
          "Category": "Deploy",
          "Owner": "AWS",
          "Provider": "S3",
          "Version": "1",
        }),
        json!({
          "BucketName": { "Ref": hosting.bucket },
          "Extract": if deploy.extract { "true" } else { "false" },
        }),
      )
    }
  };

  let mut value = json!({
    "Name": action.name,
    "ActionTypeId": type_id,
    "Configuration": configuration,
  });

  if let Some(run_order) = action.run_order {
    value["RunOrder"] = json!(run_order);
  }
  if let Some(input) = &action.input {
    value["InputArtifacts"] = json!([{ "Name": input }]);
  }
  if !action.outputs.is_empty() {
    let outputs: Vec<Value> = action.outputs.iter().map(|o| json!({ "Name": o })).collect();
    value["OutputArtifacts"] = json!(outputs);
  }

  Ok(value)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::hosting::{BucketDef, DistributionDef};
  use crate::pipeline::SourceDef;
  use crate::util::hash::Hashable;

  fn sample_manifest() -> (Manifest, ObjectHash, PipelineDef) {
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
      SourceDef {
        owner: "acme".to_string(),
        repo: "webapp".to_string(),
        branch: "main".to_string(),
        token: "$${secret:deploy/github:GITHUB_TOKEN}".to_string(),
        entry: "deploy/github".to_string(),
      },
      BuildProjectDef::default(),
      true,
    );
    let pipeline_hash = pipeline.compute_hash().unwrap();

    let mut manifest = Manifest::default();
    manifest.hostings.insert(hosting_hash, hosting);
    manifest.pipelines.insert(pipeline_hash.clone(), pipeline.clone());
    (manifest, pipeline_hash, pipeline)
  }

  fn synthesized() -> (Template, Manifest, ObjectHash, PipelineDef) {
    let (manifest, hash, def) = sample_manifest();
    let mut template = Template::new();
    synthesize_pipeline(&mut template, &manifest, &hash, &def).unwrap();
    (template, manifest, hash, def)
  }

  fn pipeline_resource(template: &Template) -> &Value {
    &template
      .resources
      .values()
      .find(|r| r.kind == "AWS::CodePipeline::Pipeline")
      .expect("pipeline resource should exist")
      .properties
  }

  #[test]
  fn stages_appear_in_declared_order() {
    let (template, ..) = synthesized();
    let properties = pipeline_resource(&template);

    let names: Vec<&str> = properties["Stages"]
      .as_array()
      .unwrap()
      .iter()
      .map(|s| s["Name"].as_str().unwrap())
      .collect();
    assert_eq!(names, vec!["Source", "Build", "Deploy"]);
  }

  #[test]
  fn deploy_run_order_precedes_invalidate_run_order() {
    let (template, ..) = synthesized();
    let properties = pipeline_resource(&template);

    let deploy_stage = &properties["Stages"][2];
    let actions = deploy_stage["Actions"].as_array().unwrap();

    let deploy = actions
      .iter()
      .find(|a| a["ActionTypeId"]["Provider"] == "S3")
      .unwrap();
    let invalidate = actions
      .iter()
      .find(|a| a["ActionTypeId"]["Provider"] == "CodeBuild")
      .unwrap();

    assert!(deploy["RunOrder"].as_u64().unwrap() < invalidate["RunOrder"].as_u64().unwrap());
  }

  #[test]
  fn oauth_token_is_a_dynamic_reference() {
    let (template, ..) = synthesized();
    let properties = pipeline_resource(&template);

    let token = properties["Stages"][0]["Actions"][0]["Configuration"]["OAuthToken"]
      .as_str()
      .unwrap();
    assert_eq!(
      token,
      "{{resolve:secretsmanager:deploy/github:SecretString:GITHUB_TOKEN}}"
    );
  }

  #[test]
  fn invalidation_role_is_scoped_to_the_one_distribution() {
    let (template, manifest, ..) = synthesized();

    let (hosting_hash, hosting_def) = manifest.hostings.iter().next().unwrap();
    let ids = HostingResources::for_unit(hosting_hash, hosting_def);

    let role = template
      .resources
      .iter()
      .find(|(id, r)| r.kind == "AWS::IAM::Role" && id.contains("InvalidateCache"))
      .map(|(_, r)| r)
      .expect("invalidation role should exist");

    let policies = role.properties["Policies"].as_array().unwrap();
    assert_eq!(policies.len(), 1);

    let statements = policies[0]["PolicyDocument"]["Statement"].as_array().unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0]["Action"], json!(["cloudfront:CreateInvalidation"]));

    let resource = serde_json::to_string(&statements[0]["Resource"]).unwrap();
    assert!(resource.contains(&ids.distribution));
    assert!(!resource.contains("distribution/*"));
  }

  #[test]
  fn invalidate_project_receives_the_distribution_id() {
    let (template, manifest, ..) = synthesized();

    let (hosting_hash, hosting_def) = manifest.hostings.iter().next().unwrap();
    let ids = HostingResources::for_unit(hosting_hash, hosting_def);

    let project = template
      .resources
      .iter()
      .find(|(id, r)| r.kind == "AWS::CodeBuild::Project" && id.contains("InvalidateCache"))
      .map(|(_, r)| r)
      .expect("invalidate project should exist");

    let env = project.properties["Environment"]["EnvironmentVariables"]
      .as_array()
      .unwrap();
    assert_eq!(env[0]["Name"], json!("DISTRIBUTION_ID"));
    assert_eq!(env[0]["Value"], json!({ "Ref": ids.distribution }));

    let spec = project.properties["Source"]["BuildSpec"].as_str().unwrap();
    assert!(spec.contains("create-invalidation"));
    assert!(spec.contains(r#"--paths \"/*\""#) || spec.contains(r#"--paths "/*""#));
  }

  #[test]
  fn build_spec_carries_the_artifact_contract() {
    let (template, ..) = synthesized();

    let project = template
      .resources
      .iter()
      .find(|(id, r)| r.kind == "AWS::CodeBuild::Project" && id.contains("AppBuild"))
      .map(|(_, r)| r)
      .expect("app build project should exist");

    let spec: Value =
      serde_json::from_str(project.properties["Source"]["BuildSpec"].as_str().unwrap()).unwrap();
    assert_eq!(spec["phases"]["install"]["commands"], json!(["npm i"]));
    assert_eq!(spec["phases"]["build"]["commands"], json!(["npm run build"]));
    assert_eq!(spec["artifacts"]["base-directory"], json!("build"));
    assert_eq!(spec["artifacts"]["files"], json!(["**/*"]));
  }

  #[test]
  fn deploy_action_targets_the_hosting_bucket_with_extract() {
    let (template, manifest, ..) = synthesized();

    let (hosting_hash, hosting_def) = manifest.hostings.iter().next().unwrap();
    let ids = HostingResources::for_unit(hosting_hash, hosting_def);

    let properties = pipeline_resource(&template);
    let deploy = &properties["Stages"][2]["Actions"][0];

    assert_eq!(deploy["Configuration"]["BucketName"], json!({ "Ref": ids.bucket }));
    assert_eq!(deploy["Configuration"]["Extract"], json!("true"));
    assert_eq!(deploy["InputArtifacts"], json!([{ "Name": "build" }]));
  }

  #[test]
  fn restart_on_update_is_carried_through() {
    let (template, ..) = synthesized();
    let properties = pipeline_resource(&template);
    assert_eq!(properties["RestartExecutionOnUpdate"], json!(true));
  }

  #[test]
  fn unknown_hosting_fails_synthesis() {
    let (manifest, hash, def) = sample_manifest();
    let mut broken = manifest.clone();
    broken.hostings.clear();

    let mut template = Template::new();
    let err = synthesize_pipeline(&mut template, &broken, &hash, &def).unwrap_err();
    assert!(matches!(err, SynthError::UnknownHosting(_)));
  }

  #[test]
  fn artifact_store_bucket_is_private() {
    let (template, ..) = synthesized();

    let artifacts = template
      .resources
      .iter()
      .find(|(id, r)| r.kind == "AWS::S3::Bucket" && id.contains("Artifacts"))
      .map(|(_, r)| r)
      .expect("artifact store bucket should exist");

    let block = &artifacts.properties["PublicAccessBlockConfiguration"];
    assert_eq!(block["BlockPublicAcls"], json!(true));
    assert_eq!(block["RestrictPublicBuckets"], json!(true));
  }
}
