mod diff;
mod info;
mod init;
mod plan;
mod synth;

pub use diff::cmd_diff;
pub use info::cmd_info;
pub use init::cmd_init;
pub use plan::cmd_plan;
pub use synth::cmd_synth;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use stacklua_lib::consts::DEFAULT_SECRETS;
use stacklua_lib::eval::evaluate_config;
use stacklua_lib::manifest::Manifest;
use stacklua_lib::secrets::SecretStore;

/// Directory containing the config file.
pub(crate) fn config_dir(config: &Path) -> &Path {
  match config.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  }
}

/// Evaluate a config against its secret store.
///
/// The Lua error type is not Send+Sync, so evaluation errors are flattened
/// into anyhow messages here instead of propagating with `?`.
pub(crate) fn evaluate(config: &Path, secrets: Option<PathBuf>) -> Result<Manifest> {
  if !config.exists() {
    bail!("config file not found: {}", config.display());
  }

  let secrets_path = secrets.unwrap_or_else(|| config_dir(config).join(DEFAULT_SECRETS));
  let store = SecretStore::load_or_empty(&secrets_path)
    .with_context(|| format!("failed to load secret store: {}", secrets_path.display()))?;

  evaluate_config(config, store)
    .map_err(|e| anyhow::anyhow!("failed to evaluate {}: {}", config.display(), e))
}
