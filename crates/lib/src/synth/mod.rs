//! Template synthesis.
//!
//! Synthesis lowers a validated [`Manifest`] into a CloudFormation-format
//! template: a map of logical resources plus outputs. It is a pure function
//! of the manifest; logical IDs derive from unit ids and content-hash
//! prefixes, and all maps are ordered, so the same manifest always produces
//! the same template bytes.
//!
//! Handle placeholders (`$${hosting:...}`) are resolved structurally into
//! `Ref`/`Fn::GetAtt` against the hosting unit's resources; secret
//! placeholders (`$${secret:...}`) are resolved textually into provider
//! dynamic references, so credentials stay out of the template.

mod hosting;
mod pipeline;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::consts::TEMPLATE_FORMAT_VERSION;
use crate::manifest::Manifest;
use crate::placeholder::{PlaceholderError, Resolver};
use crate::util::hash::ObjectHash;

pub use hosting::HostingResources;

/// Errors raised during synthesis.
#[derive(Debug, Error)]
pub enum SynthError {
  #[error("unknown hosting unit referenced during synthesis: {0}")]
  UnknownHosting(ObjectHash),

  #[error("duplicate logical resource id: {0}")]
  DuplicateLogicalId(String),

  #[error("placeholder resolution failed: {0}")]
  Placeholder(#[from] PlaceholderError),

  #[error("failed to serialize template: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// A single resource in the synthesized template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
  #[serde(rename = "Type")]
  pub kind: String,
  #[serde(rename = "Properties")]
  pub properties: Value,
}

/// A template output value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateOutput {
  #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(rename = "Value")]
  pub value: Value,
}

/// The complete synthesized template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
  #[serde(rename = "AWSTemplateFormatVersion")]
  pub format_version: String,
  #[serde(rename = "Resources")]
  pub resources: BTreeMap<String, Resource>,
  #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty", default)]
  pub outputs: BTreeMap<String, TemplateOutput>,
}

impl Template {
  pub fn new() -> Self {
    Self {
      format_version: TEMPLATE_FORMAT_VERSION.to_string(),
      resources: BTreeMap::new(),
      outputs: BTreeMap::new(),
    }
  }

  /// Add a resource, rejecting logical id collisions.
  pub fn add_resource(
    &mut self,
    logical_id: String,
    kind: &str,
    properties: Value,
  ) -> Result<(), SynthError> {
    if self.resources.contains_key(&logical_id) {
      return Err(SynthError::DuplicateLogicalId(logical_id));
    }
    self.resources.insert(
      logical_id,
      Resource {
        kind: kind.to_string(),
        properties,
      },
    );
    Ok(())
  }

  pub fn add_output(&mut self, name: String, description: &str, value: Value) {
    self.outputs.insert(
      name,
      TemplateOutput {
        description: Some(description.to_string()),
        value,
      },
    );
  }

  /// Serialize the template to pretty-printed JSON.
  pub fn to_json_pretty(&self) -> Result<String, SynthError> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}

impl Default for Template {
  fn default() -> Self {
    Self::new()
  }
}

/// Synthesize a manifest into a template.
pub fn synthesize(manifest: &Manifest) -> Result<Template, SynthError> {
  let mut template = Template::new();

  for (hash, def) in &manifest.hostings {
    debug!(id = %def.id, hash = %hash, "synthesizing hosting unit");
    hosting::synthesize_hosting(&mut template, hash, def)?;
  }

  for (hash, def) in &manifest.pipelines {
    debug!(id = %def.id, hash = %hash, "synthesizing pipeline unit");
    pipeline::synthesize_pipeline(&mut template, manifest, hash, def)?;
  }

  Ok(template)
}

/// Resolver used for textual placeholder substitution in synthesized values.
///
/// Secrets become provider dynamic references, resolved by the provider at
/// deploy time. Hosting handles have no textual form; they are resolved
/// structurally by the unit synthesizers, so hitting one here is an error.
pub(crate) struct DynamicRefResolver;

impl Resolver for DynamicRefResolver {
  fn resolve_hosting(&self, hash: &str, output: &str) -> Result<String, PlaceholderError> {
    Err(PlaceholderError::UnresolvedHosting {
      hash: hash.to_string(),
      output: output.to_string(),
    })
  }

  fn resolve_secret(&self, entry: &str, field: &str) -> Result<String, PlaceholderError> {
    Ok(format!("{{{{resolve:secretsmanager:{entry}:SecretString:{field}}}}}"))
  }
}

/// Convert a unit id to the PascalCase prefix of its logical ids.
///
/// CloudFormation logical ids are alphanumeric; separators in unit ids are
/// treated as word boundaries (`webapp-deploy` -> `WebappDeploy`).
pub(crate) fn pascal_case(id: &str) -> String {
  let mut out = String::with_capacity(id.len());
  let mut at_boundary = true;

  for ch in id.chars() {
    if ch.is_ascii_alphanumeric() {
      if at_boundary {
        out.extend(ch.to_uppercase());
        at_boundary = false;
      } else {
        out.push(ch);
      }
    } else {
      at_boundary = true;
    }
  }

  out
}

/// Build a logical resource id: unit prefix + resource suffix + hash prefix.
///
/// The hash prefix keeps ids stable for an unchanged definition and distinct
/// across units that share an id prefix.
pub(crate) fn logical_id(unit_id: &str, suffix: &str, hash: &ObjectHash) -> String {
  let prefix_len = hash.0.len().min(8);
  format!(
    "{}{}{}",
    pascal_case(unit_id),
    suffix,
    hash.0[..prefix_len].to_uppercase()
  )
}
