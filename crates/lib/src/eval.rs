//! Configuration file evaluation.
//!
//! This module provides `evaluate_config`, which takes a path to a Lua
//! configuration file plus a loaded secret store and returns the validated
//! `Manifest` containing all hosting and pipeline units the config defined.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;
use tracing::{debug, info};

use crate::lua::runtime;
use crate::manifest::Manifest;
use crate::pipeline::validate::{ValidateError, validate_manifest};
use crate::secrets::SecretStore;

/// Errors that can occur during config evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  /// Lua evaluation error (syntax errors, bad specs, secret resolution).
  #[error("lua error: {0}")]
  Lua(#[from] LuaError),

  /// Manifest-wide invariant violation.
  #[error("validation error: {0}")]
  Validation(#[from] ValidateError),
}

/// Evaluate a Lua configuration file and return the resulting manifest.
///
/// This function:
/// 1. Creates a new Lua runtime with the `stack` global
/// 2. Loads and executes the configuration file
/// 3. Calls the config's `setup()` function, during which unit constructors
///    register definitions into the manifest
/// 4. Validates the manifest (artifact wiring, run orders, handle references)
///
/// # Example
/// ```ignore
/// use std::path::Path;
/// use stacklua_lib::eval::evaluate_config;
/// use stacklua_lib::secrets::SecretStore;
///
/// let secrets = SecretStore::load(Path::new("secrets.yaml"))?;
/// let manifest = evaluate_config(Path::new("stack.lua"), secrets)?;
/// println!("Units: {}", manifest.unit_count());
/// ```
pub fn evaluate_config(path: &Path, secrets: SecretStore) -> Result<Manifest, EvalError> {
  let manifest = Rc::new(RefCell::new(Manifest::default()));

  // Create runtime and evaluate in a block so lua is dropped before the
  // manifest Rc is unwrapped.
  {
    let lua = runtime::create_runtime(manifest.clone(), Rc::new(secrets))?;
    let config = runtime::load_file(&lua, path)?;

    // Config should return a table with a `setup` function.
    let LuaValue::Table(config_table) = config else {
      return Err(LuaError::external("config must return a table with a 'setup' function").into());
    };

    let setup: LuaFunction = config_table
      .get("setup")
      .map_err(|_| LuaError::external("config must return a table with a 'setup' function"))?;

    debug!(config = %path.display(), "calling setup()");
    setup.call::<()>(())?;
  }

  let manifest = Rc::try_unwrap(manifest)
    .expect("manifest still has references")
    .into_inner();

  validate_manifest(&manifest)?;

  info!(
    hostings = manifest.hostings.len(),
    pipelines = manifest.pipelines.len(),
    "evaluated config"
  );

  Ok(manifest)
}
