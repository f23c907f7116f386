//! Hosting unit definition types.
//!
//! A hosting unit provisions a publicly readable content bucket with a
//! website endpoint and CORS enabled, a CDN distribution whose sole origin is
//! that bucket, and optionally an initial content sync from a local build
//! directory. It exposes two handles to other units: `bucket` and
//! `distribution`.

use serde::{Deserialize, Serialize};

use crate::util::hash::{ContentHash, Hashable, ObjectHash};

/// CORS rule applied to the content bucket.
///
/// The defaults allow any origin to issue the common HTTP methods and expose
/// the provider's standard response headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsRule {
  pub allowed_origins: Vec<String>,
  pub allowed_methods: Vec<String>,
  pub allowed_headers: Vec<String>,
  pub exposed_headers: Vec<String>,
}

impl Default for CorsRule {
  fn default() -> Self {
    Self {
      allowed_origins: vec!["*".to_string()],
      allowed_methods: ["HEAD", "GET", "PUT", "POST", "DELETE"]
        .iter()
        .map(|m| m.to_string())
        .collect(),
      allowed_headers: vec!["*".to_string()],
      exposed_headers: [
        "x-amz-server-side-encryption",
        "x-amz-request-id",
        "x-amz-id-2",
      ]
      .iter()
      .map(|h| h.to_string())
      .collect(),
    }
  }
}

/// The content bucket of a hosting unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDef {
  /// Index document served from the website endpoint.
  pub website_index: String,
  /// Whether objects are publicly readable.
  pub public_read: bool,
  pub cors: CorsRule,
}

impl Default for BucketDef {
  fn default() -> Self {
    Self {
      website_index: "index.html".to_string(),
      public_read: true,
      cors: CorsRule::default(),
    }
  }
}

/// The CDN distribution fronting the bucket.
///
/// The origin wiring is implied: the unit's bucket is the sole origin with a
/// single default cache behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionDef {
  pub comment: Option<String>,
}

/// Initial content sync from a local directory into the bucket.
///
/// The fingerprint is computed over the directory tree at definition time, so
/// a content change produces a different unit hash and a changed template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDef {
  /// Source directory, as written in the config.
  pub source: String,
  pub fingerprint: ContentHash,
}

/// A complete hosting unit definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostingDef {
  pub id: String,
  pub bucket: BucketDef,
  pub distribution: DistributionDef,
  pub sync: Option<SyncDef>,
}

impl Hashable for HostingDef {}

/// Handle names a hosting unit exposes to other units.
pub const HOSTING_HANDLES: [&str; 2] = ["bucket", "distribution"];

/// Build the placeholder string for one of a hosting unit's handles.
pub fn handle_placeholder(hash: &ObjectHash, output: &str) -> String {
  format!("$${{hosting:{}:{}}}", hash.0, output)
}
