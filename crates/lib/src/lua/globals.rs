//! Global Lua values and the `stack` table.
//!
//! This module registers the `stack` global table which provides:
//! - `stack.hosting{}` - define a hosting unit
//! - `stack.pipeline{}` - define a pipeline unit
//! - `stack.secret()` - reference a secret store entry
//! - `stack.dir` - directory of the config file being evaluated
//! - `stack.version` - tool version string

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;

use crate::hosting::lua::register_stack_hosting;
use crate::manifest::Manifest;
use crate::pipeline::lua::register_stack_pipeline;
use crate::secrets::SecretStore;

/// Metatable `__type` marker for secret references returned to Lua.
pub const SECRET_REF_TYPE: &str = "SecretRef";

/// Register the `stack` global table in the Lua runtime.
pub fn register_globals(
  lua: &Lua,
  manifest: Rc<RefCell<Manifest>>,
  secrets: Rc<SecretStore>,
) -> LuaResult<()> {
  let stack = lua.create_table()?;

  stack.set("version", env!("CARGO_PKG_VERSION"))?;

  // Register stack.hosting{}
  register_stack_hosting(lua, &stack, manifest.clone())?;

  // Register stack.pipeline{}
  register_stack_pipeline(lua, &stack, manifest, secrets.clone())?;

  // Register stack.secret(entry)
  let secret_fn = lua.create_function(move |lua, entry: String| {
    secrets
      .check_entry(&entry)
      .map_err(|e| LuaError::external(e.to_string()))?;

    let ref_table = lua.create_table()?;
    ref_table.set("entry", entry.as_str())?;

    let mt = lua.create_table()?;
    mt.set("__type", SECRET_REF_TYPE)?;
    ref_table.set_metatable(Some(mt))?;

    Ok(ref_table)
  })?;
  stack.set("secret", secret_fn)?;

  lua.globals().set("stack", stack)?;

  Ok(())
}

/// Read a Lua sequence of strings, also accepting a bare string as a
/// one-element sequence.
pub fn string_or_seq(value: LuaValue, what: &str) -> LuaResult<Vec<String>> {
  match value {
    LuaValue::String(s) => Ok(vec![s.to_str()?.to_string()]),
    LuaValue::Table(t) => {
      let mut out = Vec::with_capacity(t.raw_len());
      for item in t.sequence_values::<String>() {
        out.push(item?);
      }
      if out.is_empty() {
        return Err(LuaError::external(format!("{what} must not be empty")));
      }
      Ok(out)
    }
    _ => Err(LuaError::external(format!(
      "{what} must be a string or a list of strings"
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn create_test_lua() -> LuaResult<Lua> {
    let lua = Lua::new();
    let manifest = Rc::new(RefCell::new(Manifest::default()));
    let secrets = Rc::new(SecretStore::empty());
    register_globals(&lua, manifest, secrets)?;
    Ok(lua)
  }

  #[test]
  fn stack_global_exists() -> LuaResult<()> {
    let lua = create_test_lua()?;
    let stack: LuaTable = lua.globals().get("stack")?;

    assert!(stack.contains_key("hosting")?);
    assert!(stack.contains_key("pipeline")?);
    assert!(stack.contains_key("secret")?);
    assert!(stack.contains_key("version")?);
    Ok(())
  }

  #[test]
  fn secret_against_empty_store_fails() -> LuaResult<()> {
    let lua = create_test_lua()?;

    let result = lua.load(r#"return stack.secret("deploy/github")"#).eval::<LuaTable>();
    assert!(result.is_err());
    let err = result.unwrap_err().to_string();
    assert!(err.contains("deploy/github"), "error should name the entry: {}", err);
    Ok(())
  }

  #[test]
  fn string_or_seq_accepts_both_shapes() -> LuaResult<()> {
    let lua = Lua::new();

    let s: LuaValue = lua.load(r#"return "npm i""#).eval()?;
    assert_eq!(string_or_seq(s, "install")?, vec!["npm i"]);

    let t: LuaValue = lua.load(r#"return { "npm ci", "npm test" }"#).eval()?;
    assert_eq!(string_or_seq(t, "install")?, vec!["npm ci", "npm test"]);

    let empty: LuaValue = lua.load("return {}").eval()?;
    assert!(string_or_seq(empty, "install").is_err());

    let num: LuaValue = lua.load("return 42").eval()?;
    assert!(string_or_seq(num, "install").is_err());

    Ok(())
  }
}
