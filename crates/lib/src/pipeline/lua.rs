//! Lua bindings for `stack.pipeline{}`.
//!
//! The constructor consumes a `HostingRef`, resolves the GitHub source
//! settings from the secret store, wires the canonical three-stage sequence
//! and registers the resulting [`PipelineDef`] in the manifest.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;

use crate::consts::{GITHUB_OWNER_FIELD, GITHUB_REPO_FIELD, GITHUB_TOKEN_FIELD};
use crate::hosting::HOSTING_REF_TYPE;
use crate::lua::globals::{SECRET_REF_TYPE, string_or_seq};
use crate::manifest::Manifest;
use crate::secrets::{SecretStore, secret_placeholder};
use crate::util::hash::{Hashable, ObjectHash};

use super::{ArtifactSpec, BuildProjectDef, PIPELINE_REF_TYPE, PipelineDef, SourceDef};

/// Register the `stack.pipeline` function on the stack table.
///
/// The `stack.pipeline{}` function:
/// 1. Resolves the `hosting` field to a hosting unit already in the manifest
/// 2. Resolves source credentials from the secret store (failing evaluation
///    on a missing entry, missing field, or empty field)
/// 3. Builds the Source -> Build -> Deploy stage sequence with the
///    deploy/invalidate run-order split
/// 4. Computes the definition hash and adds it to the manifest
/// 5. Returns a `PipelineRef` table
pub fn register_stack_pipeline(
  lua: &Lua,
  stack_table: &LuaTable,
  manifest: Rc<RefCell<Manifest>>,
  secrets: Rc<SecretStore>,
) -> LuaResult<()> {
  let pipeline_fn = lua.create_function(move |lua, spec_table: LuaTable| {
    let id: String = spec_table
      .get("id")
      .map_err(|_| LuaError::external("pipeline spec requires an 'id' field"))?;

    let hosting_value: LuaValue = spec_table.get("hosting")?;
    let hosting = parse_hosting_ref(hosting_value, &manifest.borrow())?;

    let source_table: LuaTable = spec_table
      .get("source")
      .map_err(|_| LuaError::external("pipeline spec requires a 'source' table"))?;
    let source = parse_source(&source_table, &secrets)?;

    let build = parse_build(spec_table.get("build")?)?;

    let restart_on_update: Option<bool> = spec_table.get("restart_on_update")?;

    let def = PipelineDef::three_stage(
      id.clone(),
      hosting,
      source,
      build,
      restart_on_update.unwrap_or(true),
    );

    let hash = def
      .compute_hash()
      .map_err(|e| LuaError::external(format!("failed to compute pipeline hash: {}", e)))?;

    {
      let mut manifest = manifest.borrow_mut();
      if manifest.pipelines.contains_key(&hash) {
        tracing::warn!(hash = %hash.0, id = %id, "duplicate pipeline unit, skipping insertion");
      } else {
        manifest.pipelines.insert(hash.clone(), def);
      }
    }

    let ref_table = lua.create_table()?;
    ref_table.set("id", id.as_str())?;
    ref_table.set("hash", hash.0.as_str())?;

    let mt = lua.create_table()?;
    mt.set("__type", PIPELINE_REF_TYPE)?;
    ref_table.set_metatable(Some(mt))?;

    Ok(ref_table)
  })?;

  stack_table.set("pipeline", pipeline_fn)?;
  Ok(())
}

/// Parse a `HostingRef` table (detected via metatable `__type`) and validate
/// that the referenced hosting unit exists in the manifest.
fn parse_hosting_ref(value: LuaValue, manifest: &Manifest) -> LuaResult<ObjectHash> {
  let LuaValue::Table(table) = value else {
    return Err(LuaError::external(
      "pipeline spec requires 'hosting' to be the value returned by stack.hosting{}",
    ));
  };

  let is_hosting_ref = table
    .metatable()
    .and_then(|mt| mt.get::<String>("__type").ok())
    .is_some_and(|t| t == HOSTING_REF_TYPE);
  if !is_hosting_ref {
    return Err(LuaError::external(
      "pipeline 'hosting' field is not a HostingRef; pass the value returned by stack.hosting{}",
    ));
  }

  let hash: String = table.get("hash")?;
  let hosting_hash = ObjectHash(hash);

  if !manifest.hostings.contains_key(&hosting_hash) {
    return Err(LuaError::external(format!(
      "referenced hosting unit not found in manifest: {}",
      hosting_hash.0
    )));
  }

  Ok(hosting_hash)
}

/// Parse the source table and resolve its credentials.
///
/// Owner and repo are embedded as resolved strings; the token stays a
/// placeholder so the credential never lands in the manifest.
fn parse_source(table: &LuaTable, secrets: &SecretStore) -> LuaResult<SourceDef> {
  let entry = parse_secret_entry(table.get("secret")?)?;

  let owner = secrets
    .resolve(&entry, GITHUB_OWNER_FIELD)
    .map_err(|e| LuaError::external(e.to_string()))?
    .to_string();
  let repo = secrets
    .resolve(&entry, GITHUB_REPO_FIELD)
    .map_err(|e| LuaError::external(e.to_string()))?
    .to_string();
  secrets
    .check_field(&entry, GITHUB_TOKEN_FIELD)
    .map_err(|e| LuaError::external(e.to_string()))?;

  let branch: Option<String> = table.get("branch")?;

  Ok(SourceDef {
    owner,
    repo,
    branch: branch.unwrap_or_else(|| "main".to_string()),
    token: secret_placeholder(&entry, GITHUB_TOKEN_FIELD),
    entry,
  })
}

/// Accept either a `SecretRef` from `stack.secret()` or a bare entry name.
fn parse_secret_entry(value: LuaValue) -> LuaResult<String> {
  match value {
    LuaValue::String(s) => Ok(s.to_str()?.to_string()),
    LuaValue::Table(table) => {
      let is_secret_ref = table
        .metatable()
        .and_then(|mt| mt.get::<String>("__type").ok())
        .is_some_and(|t| t == SECRET_REF_TYPE);
      if !is_secret_ref {
        return Err(LuaError::external(
          "source 'secret' table is not a SecretRef; pass stack.secret(name) or the entry name",
        ));
      }
      let entry: String = table.get("entry")?;
      Ok(entry)
    }
    LuaValue::Nil => Err(LuaError::external("source spec requires a 'secret' entry")),
    _ => Err(LuaError::external(
      "source 'secret' must be an entry name or stack.secret(name)",
    )),
  }
}

fn parse_build(value: Option<LuaTable>) -> LuaResult<BuildProjectDef> {
  let mut build = BuildProjectDef::default();
  let Some(table) = value else {
    return Ok(build);
  };

  if let Some(install) = table.get::<Option<LuaValue>>("install")? {
    build.install_commands = string_or_seq(install, "build.install")?;
  }
  if let Some(commands) = table.get::<Option<LuaValue>>("commands")? {
    build.build_commands = string_or_seq(commands, "build.commands")?;
  }
  if let Some(image) = table.get::<Option<String>>("image")? {
    build.image = image;
  }
  if let Some(artifact_table) = table.get::<Option<LuaTable>>("artifact")? {
    build.artifact = parse_artifact(&artifact_table)?;
  }

  Ok(build)
}

fn parse_artifact(table: &LuaTable) -> LuaResult<ArtifactSpec> {
  let mut artifact = ArtifactSpec::default();

  if let Some(base_dir) = table.get::<Option<String>>("base_dir")? {
    artifact.base_dir = base_dir;
  }
  if let Some(files) = table.get::<Option<LuaValue>>("files")? {
    artifact.files = string_or_seq(files, "artifact.files")?;
  }

  Ok(artifact)
}
