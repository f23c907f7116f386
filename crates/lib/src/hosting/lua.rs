//! Lua bindings for `stack.hosting{}`.
//!
//! The constructor parses a hosting spec table into a [`HostingDef`],
//! fingerprints the optional content sync source, registers the definition
//! in the manifest, and returns a `HostingRef` table exposing the unit's two
//! handles as placeholder strings.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;

use crate::lua::globals::string_or_seq;
use crate::manifest::Manifest;
use crate::util::hash::{Hashable, ObjectHash, hash_directory};

use super::{BucketDef, CorsRule, DistributionDef, HOSTING_REF_TYPE, HostingDef, SyncDef, handle_placeholder};

/// Register the `stack.hosting` function on the stack table.
///
/// The `stack.hosting{}` function:
/// 1. Parses bucket, distribution and sync settings from the spec table
/// 2. Fingerprints the sync source directory (missing directory is an error)
/// 3. Computes the definition hash and adds it to the manifest
/// 4. Returns a `HostingRef` with `outputs.bucket` / `outputs.distribution`
pub fn register_stack_hosting(
  lua: &Lua,
  stack_table: &LuaTable,
  manifest: Rc<RefCell<Manifest>>,
) -> LuaResult<()> {
  let hosting_fn = lua.create_function(move |lua, spec_table: LuaTable| {
    let id: String = spec_table
      .get("id")
      .map_err(|_| LuaError::external("hosting spec requires an 'id' field"))?;

    let bucket = parse_bucket(spec_table.get("bucket")?)?;
    let distribution = parse_distribution(spec_table.get("distribution")?)?;
    let sync = parse_sync(lua, spec_table.get("sync")?)?;

    let def = HostingDef {
      id: id.clone(),
      bucket,
      distribution,
      sync,
    };

    let hash = def
      .compute_hash()
      .map_err(|e| LuaError::external(format!("failed to compute hosting hash: {}", e)))?;

    {
      let mut manifest = manifest.borrow_mut();
      if manifest.hostings.contains_key(&hash) {
        tracing::warn!(hash = %hash.0, id = %id, "duplicate hosting unit, skipping insertion");
      } else {
        manifest.hostings.insert(hash.clone(), def);
      }
    }

    make_hosting_ref(lua, &id, &hash)
  })?;

  stack_table.set("hosting", hosting_fn)?;
  Ok(())
}

/// Build the `HostingRef` Lua table returned to the config.
fn make_hosting_ref(lua: &Lua, id: &str, hash: &ObjectHash) -> LuaResult<LuaTable> {
  let ref_table = lua.create_table()?;
  ref_table.set("id", id)?;
  ref_table.set("hash", hash.0.as_str())?;

  let outputs = lua.create_table()?;
  for output in super::HOSTING_HANDLES {
    outputs.set(output, handle_placeholder(hash, output))?;
  }
  ref_table.set("outputs", outputs)?;

  let mt = lua.create_table()?;
  mt.set("__type", HOSTING_REF_TYPE)?;
  ref_table.set_metatable(Some(mt))?;

  Ok(ref_table)
}

fn parse_bucket(value: Option<LuaTable>) -> LuaResult<BucketDef> {
  let mut bucket = BucketDef::default();
  let Some(table) = value else {
    return Ok(bucket);
  };

  if let Some(index) = table.get::<Option<String>>("website_index")? {
    bucket.website_index = index;
  }
  if let Some(public) = table.get::<Option<bool>>("public_read")? {
    bucket.public_read = public;
  }
  if let Some(cors_table) = table.get::<Option<LuaTable>>("cors")? {
    bucket.cors = parse_cors(&cors_table)?;
  }

  Ok(bucket)
}

fn parse_cors(table: &LuaTable) -> LuaResult<CorsRule> {
  let mut cors = CorsRule::default();

  if let Some(origins) = table.get::<Option<LuaValue>>("origins")? {
    cors.allowed_origins = string_or_seq(origins, "cors.origins")?;
  }
  if let Some(methods) = table.get::<Option<LuaValue>>("methods")? {
    cors.allowed_methods = string_or_seq(methods, "cors.methods")?;
  }
  if let Some(headers) = table.get::<Option<LuaValue>>("headers")? {
    cors.allowed_headers = string_or_seq(headers, "cors.headers")?;
  }
  if let Some(exposed) = table.get::<Option<LuaValue>>("exposed_headers")? {
    cors.exposed_headers = string_or_seq(exposed, "cors.exposed_headers")?;
  }

  Ok(cors)
}

fn parse_distribution(value: Option<LuaTable>) -> LuaResult<DistributionDef> {
  let mut distribution = DistributionDef::default();
  let Some(table) = value else {
    return Ok(distribution);
  };

  distribution.comment = table.get::<Option<String>>("comment")?;
  Ok(distribution)
}

fn parse_sync(lua: &Lua, value: Option<LuaTable>) -> LuaResult<Option<SyncDef>> {
  let Some(table) = value else {
    return Ok(None);
  };

  let source: String = table
    .get("source")
    .map_err(|_| LuaError::external("sync spec requires a 'source' directory"))?;

  let dir = resolve_source_dir(lua, &source)?;
  if !dir.is_dir() {
    return Err(LuaError::external(format!(
      "sync source directory not found: {}",
      dir.display()
    )));
  }

  let fingerprint = hash_directory(&dir)
    .map_err(|e| LuaError::external(format!("failed to fingerprint '{}': {}", dir.display(), e)))?;

  Ok(Some(SyncDef { source, fingerprint }))
}

/// Resolve a sync source relative to the config file's directory
/// (`stack.dir`), falling back to the process working directory when the
/// config was loaded from a string.
fn resolve_source_dir(lua: &Lua, source: &str) -> LuaResult<PathBuf> {
  let path = Path::new(source);
  if path.is_absolute() {
    return Ok(path.to_path_buf());
  }

  let stack: LuaTable = lua.globals().get("stack")?;
  let dir: Option<String> = stack.get("dir")?;
  Ok(match dir {
    Some(dir) => Path::new(&dir).join(path),
    None => path.to_path_buf(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lua::globals::register_globals;
  use crate::secrets::SecretStore;

  fn create_test_lua_with_manifest() -> LuaResult<(Lua, Rc<RefCell<Manifest>>)> {
    let lua = Lua::new();
    let manifest = Rc::new(RefCell::new(Manifest::default()));
    register_globals(&lua, manifest.clone(), Rc::new(SecretStore::empty()))?;
    Ok((lua, manifest))
  }

  #[test]
  fn minimal_hosting_uses_defaults() -> LuaResult<()> {
    let (lua, manifest) = create_test_lua_with_manifest()?;

    let result: LuaTable = lua.load(r#"return stack.hosting({ id = "webapp" })"#).eval()?;

    let id: String = result.get("id")?;
    assert_eq!(id, "webapp");

    let mt = result.metatable().expect("should have metatable");
    let type_name: String = mt.get("__type")?;
    assert_eq!(type_name, HOSTING_REF_TYPE);

    let manifest = manifest.borrow();
    assert_eq!(manifest.hostings.len(), 1);

    let def = manifest.hostings.values().next().unwrap();
    assert_eq!(def.bucket.website_index, "index.html");
    assert!(def.bucket.public_read);
    assert_eq!(def.bucket.cors.allowed_origins, vec!["*"]);
    assert!(def.sync.is_none());
    Ok(())
  }

  #[test]
  fn hosting_ref_exposes_both_handles() -> LuaResult<()> {
    let (lua, _) = create_test_lua_with_manifest()?;

    let result: LuaTable = lua.load(r#"return stack.hosting({ id = "webapp" })"#).eval()?;

    let hash: String = result.get("hash")?;
    let outputs: LuaTable = result.get("outputs")?;
    let bucket: String = outputs.get("bucket")?;
    let distribution: String = outputs.get("distribution")?;

    assert_eq!(bucket, format!("$${{hosting:{}:bucket}}", hash));
    assert_eq!(distribution, format!("$${{hosting:{}:distribution}}", hash));
    Ok(())
  }

  #[test]
  fn bucket_settings_override_defaults() -> LuaResult<()> {
    let (lua, manifest) = create_test_lua_with_manifest()?;

    lua
      .load(
        r#"
          stack.hosting({
            id = "webapp",
            bucket = {
              website_index = "home.html",
              cors = { origins = { "https://example.com" } },
            },
            distribution = { comment = "webapp edge" },
          })
        "#,
      )
      .exec()?;

    let manifest = manifest.borrow();
    let def = manifest.hostings.values().next().unwrap();
    assert_eq!(def.bucket.website_index, "home.html");
    assert_eq!(def.bucket.cors.allowed_origins, vec!["https://example.com"]);
    // Unspecified CORS fields keep their defaults.
    assert_eq!(def.bucket.cors.allowed_methods.len(), 5);
    assert_eq!(def.distribution.comment.as_deref(), Some("webapp edge"));
    Ok(())
  }

  #[test]
  fn hosting_without_id_fails() -> LuaResult<()> {
    let (lua, _) = create_test_lua_with_manifest()?;

    let result = lua.load(r#"return stack.hosting({})"#).eval::<LuaTable>();
    assert!(result.is_err());
    let err = result.unwrap_err().to_string();
    assert!(err.contains("id"), "error should mention 'id': {}", err);
    Ok(())
  }

  #[test]
  fn sync_with_missing_directory_fails() -> LuaResult<()> {
    let (lua, _) = create_test_lua_with_manifest()?;

    let result = lua
      .load(
        r#"
          return stack.hosting({
            id = "webapp",
            sync = { source = "/definitely/not/a/real/build/dir" },
          })
        "#,
      )
      .eval::<LuaTable>();

    assert!(result.is_err());
    let err = result.unwrap_err().to_string();
    assert!(err.contains("not found"), "error should mention the directory: {}", err);
    Ok(())
  }

  #[test]
  fn sync_fingerprints_the_source_directory() -> LuaResult<()> {
    let (lua, manifest) = create_test_lua_with_manifest()?;

    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("index.html"), "<html></html>").unwrap();

    lua
      .load(format!(
        r#"
          stack.hosting({{
            id = "webapp",
            sync = {{ source = "{}" }},
          }})
        "#,
        temp.path().display()
      ))
      .exec()?;

    let manifest = manifest.borrow();
    let def = manifest.hostings.values().next().unwrap();
    let sync = def.sync.as_ref().expect("sync should be set");
    assert_eq!(sync.fingerprint.0.len(), 64);
    Ok(())
  }

  #[test]
  fn duplicate_hosting_is_deduplicated() -> LuaResult<()> {
    let (lua, manifest) = create_test_lua_with_manifest()?;

    lua
      .load(
        r#"
          stack.hosting({ id = "webapp" })
          stack.hosting({ id = "webapp" })
        "#,
      )
      .exec()?;

    let manifest = manifest.borrow();
    assert_eq!(manifest.hostings.len(), 1);
    Ok(())
  }

  #[test]
  fn hosting_hash_is_deterministic() -> LuaResult<()> {
    let (lua1, _) = create_test_lua_with_manifest()?;
    let (lua2, _) = create_test_lua_with_manifest()?;

    let code = r#"return stack.hosting({ id = "webapp" })"#;
    let ref1: LuaTable = lua1.load(code).eval()?;
    let ref2: LuaTable = lua2.load(code).eval()?;

    let hash1: String = ref1.get("hash")?;
    let hash2: String = ref2.get("hash")?;
    assert_eq!(hash1, hash2);
    Ok(())
  }
}
