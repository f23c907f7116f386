//! Project scaffolding for `stack init`.

mod templates;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::consts::DEFAULT_CONFIG;

pub use templates::{SECRETS_EXAMPLE, STACK_LUA_TEMPLATE};

#[derive(Debug, Error)]
pub enum InitError {
  #[error("failed to create directory '{path}': {source}")]
  CreateDir {
    path: String,
    source: std::io::Error,
  },

  #[error("failed to write '{path}': {source}")]
  Write {
    path: String,
    source: std::io::Error,
  },
}

/// Scaffold a new stack project in `dir`.
///
/// Writes `stack.lua` and `secrets.example.yaml`, skipping files that
/// already exist so a re-run never clobbers edits. Returns the paths that
/// were written.
pub fn scaffold(dir: &Path) -> Result<Vec<PathBuf>, InitError> {
  std::fs::create_dir_all(dir).map_err(|e| InitError::CreateDir {
    path: dir.display().to_string(),
    source: e,
  })?;

  let mut written = Vec::new();

  for (name, content) in [
    (DEFAULT_CONFIG, STACK_LUA_TEMPLATE),
    ("secrets.example.yaml", SECRETS_EXAMPLE),
  ] {
    let path = dir.join(name);
    if path.exists() {
      info!(path = %path.display(), "already exists, skipping");
      continue;
    }

    std::fs::write(&path, content).map_err(|e| InitError::Write {
      path: path.display().to_string(),
      source: e,
    })?;
    written.push(path);
  }

  Ok(written)
}
