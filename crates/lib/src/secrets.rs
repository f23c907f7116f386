//! Definition-time secret store.
//!
//! Secrets live in a YAML file next to the config: a map of entry names to
//! flat field maps. Configs reference an entry by name; the fields a unit
//! needs are resolved while the config is evaluated, so a missing or
//! malformed entry fails the run before any manifest or template exists.
//!
//! Resolution never copies sensitive values into the manifest. Identifying
//! fields (repository owner/name) are embedded as plain strings; credential
//! fields are embedded as `$${secret:<entry>:<field>}` placeholders that
//! synthesis lowers to provider-side dynamic references.
//!
//! # File format
//!
//! ```yaml
//! deploy/github:
//!   GITHUB_OWNER: acme
//!   GITHUB_REPO: webapp
//!   GITHUB_TOKEN: ghp_xxxxxxxx
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

/// Errors raised while loading or resolving secrets.
#[derive(Debug, Error)]
pub enum SecretError {
  #[error("failed to read secret store '{path}': {source}")]
  Read {
    path: String,
    source: std::io::Error,
  },

  #[error("failed to parse secret store '{path}': {source}")]
  Parse {
    path: String,
    source: serde_yaml::Error,
  },

  #[error("secret entry not found: '{0}'")]
  EntryNotFound(String),

  #[error("secret entry '{entry}' is missing field '{field}'")]
  FieldMissing { entry: String, field: String },

  #[error("secret entry '{entry}' has an empty value for field '{field}'")]
  FieldEmpty { entry: String, field: String },
}

/// A loaded secret store: entry name to field map.
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
  entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl SecretStore {
  /// Create an empty store. Configs that reference no secrets evaluate fine
  /// against it.
  pub fn empty() -> Self {
    Self::default()
  }

  /// Load a secret store from a YAML file.
  pub fn load(path: &Path) -> Result<Self, SecretError> {
    let content = std::fs::read_to_string(path).map_err(|e| SecretError::Read {
      path: path.display().to_string(),
      source: e,
    })?;

    let entries: BTreeMap<String, BTreeMap<String, String>> =
      serde_yaml::from_str(&content).map_err(|e| SecretError::Parse {
        path: path.display().to_string(),
        source: e,
      })?;

    Ok(Self { entries })
  }

  /// Load the store if the file exists, otherwise return an empty store.
  ///
  /// Evaluation still fails later if the config references an entry, so a
  /// missing file only matters for configs that actually use secrets.
  pub fn load_or_empty(path: &Path) -> Result<Self, SecretError> {
    if path.exists() {
      Self::load(path)
    } else {
      Ok(Self::empty())
    }
  }

  /// Check that an entry exists.
  pub fn check_entry(&self, entry: &str) -> Result<(), SecretError> {
    if self.entries.contains_key(entry) {
      Ok(())
    } else {
      Err(SecretError::EntryNotFound(entry.to_string()))
    }
  }

  /// Resolve a field of an entry to its plaintext value.
  ///
  /// Empty values are rejected: proceeding with blank credentials would only
  /// surface as an opaque failure on provider infrastructure much later.
  pub fn resolve(&self, entry: &str, field: &str) -> Result<&str, SecretError> {
    let fields = self
      .entries
      .get(entry)
      .ok_or_else(|| SecretError::EntryNotFound(entry.to_string()))?;

    let value = fields.get(field).ok_or_else(|| SecretError::FieldMissing {
      entry: entry.to_string(),
      field: field.to_string(),
    })?;

    if value.trim().is_empty() {
      return Err(SecretError::FieldEmpty {
        entry: entry.to_string(),
        field: field.to_string(),
      });
    }

    Ok(value)
  }

  /// Check that a field exists and is non-empty, without returning the value.
  ///
  /// Used for credential fields that must stay out of the manifest.
  pub fn check_field(&self, entry: &str, field: &str) -> Result<(), SecretError> {
    self.resolve(entry, field).map(|_| ())
  }
}

/// Build a `$${secret:<entry>:<field>}` placeholder string.
pub fn secret_placeholder(entry: &str, field: &str) -> String {
  format!("$${{secret:{}:{}}}", entry, field)
}
