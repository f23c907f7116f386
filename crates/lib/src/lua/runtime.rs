use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;

use crate::lua::globals;
use crate::manifest::Manifest;
use crate::secrets::SecretStore;

/// Create a new Lua runtime with the `stack` global registered.
///
/// The manifest cell collects unit definitions as constructors run; the
/// secret store backs definition-time secret resolution.
pub fn create_runtime(manifest: Rc<RefCell<Manifest>>, secrets: Rc<SecretStore>) -> LuaResult<Lua> {
  let lua = Lua::new();
  globals::register_globals(&lua, manifest, secrets)?;
  Ok(lua)
}

/// Load and execute a Lua file at the given path.
///
/// Sets the `stack.dir` global to the directory of the loaded file so
/// relative paths in the config (content sync sources) resolve against the
/// config location, not the process working directory.
pub fn load_file(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let canonical_path = path
    .canonicalize()
    .map_err(|e| LuaError::external(format!("cannot canonicalize '{}': {}", path.display(), e)))?;
  let content = std::fs::read_to_string(&canonical_path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", canonical_path.display(), e)))?;

  let stack_globals = lua.globals().get::<LuaTable>("stack")?;
  stack_globals.set(
    "dir",
    canonical_path
      .parent()
      .unwrap_or(Path::new(""))
      .to_string_lossy()
      .to_string(),
  )?;

  let result = lua
    .load(&content)
    .set_name(format!("@{}", canonical_path.display()))
    .eval::<LuaValue>()?;
  Ok(result)
}
