//! Synthesis of hosting units.
//!
//! A hosting unit lowers to:
//! - an `AWS::S3::Bucket` with website + CORS configuration
//! - an `AWS::S3::BucketPolicy` when the bucket is public-read
//! - an `AWS::CloudFront::Distribution` with the bucket as sole origin
//! - a `Custom::ContentSync` resource when an initial sync is declared
//!
//! plus outputs for the website endpoint and the distribution domain.

use serde_json::{Value, json};

use crate::hosting::HostingDef;
use crate::util::hash::ObjectHash;

use super::{SynthError, Template, logical_id, pascal_case};

/// Logical ids of the resources a hosting unit synthesizes to.
///
/// Pipeline synthesis recomputes these from the manifest to resolve handle
/// placeholders into `Ref`/`Fn::GetAtt`, so the derivation must stay a pure
/// function of the unit hash and id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingResources {
  pub bucket: String,
  pub distribution: String,
}

impl HostingResources {
  pub fn for_unit(hash: &ObjectHash, def: &HostingDef) -> Self {
    Self {
      bucket: logical_id(&def.id, "Bucket", hash),
      distribution: logical_id(&def.id, "Distribution", hash),
    }
  }
}

/// Emit all resources and outputs for one hosting unit.
pub fn synthesize_hosting(
  template: &mut Template,
  hash: &ObjectHash,
  def: &HostingDef,
) -> Result<(), SynthError> {
  let ids = HostingResources::for_unit(hash, def);

  template.add_resource(ids.bucket.clone(), "AWS::S3::Bucket", bucket_properties(def))?;

  if def.bucket.public_read {
    template.add_resource(
      logical_id(&def.id, "BucketPolicy", hash),
      "AWS::S3::BucketPolicy",
      public_read_policy(&ids.bucket),
    )?;
  }

  template.add_resource(
    ids.distribution.clone(),
    "AWS::CloudFront::Distribution",
    distribution_properties(def, &ids.bucket),
  )?;

  if let Some(sync) = &def.sync {
    template.add_resource(
      logical_id(&def.id, "ContentSync", hash),
      "Custom::ContentSync",
      json!({
        "Bucket": { "Ref": ids.bucket },
        "Source": sync.source,
        "Fingerprint": sync.fingerprint.0,
      }),
    )?;
  }

  let prefix = pascal_case(&def.id);
  template.add_output(
    format!("{prefix}WebsiteUrl"),
    "Public website endpoint of the content bucket",
    json!({ "Fn::GetAtt": [ids.bucket, "WebsiteURL"] }),
  );
  template.add_output(
    format!("{prefix}DistributionDomain"),
    "Domain name of the CDN distribution",
    json!({ "Fn::GetAtt": [ids.distribution, "DomainName"] }),
  );

  Ok(())
}

fn bucket_properties(def: &HostingDef) -> Value {
  let cors = &def.bucket.cors;
  json!({
    "WebsiteConfiguration": {
      "IndexDocument": def.bucket.website_index,
    },
    "CorsConfiguration": {
      "CorsRules": [
        {
          "AllowedOrigins": cors.allowed_origins,
          "AllowedMethods": cors.allowed_methods,
          "AllowedHeaders": cors.allowed_headers,
          "ExposedHeaders": cors.exposed_headers,
        }
      ]
    },
  })
}

fn public_read_policy(bucket_id: &str) -> Value {
  json!({
    "Bucket": { "Ref": bucket_id },
    "PolicyDocument": {
      "Version": "2012-10-17",
      "Statement": [
        {
          "Effect": "Allow",
          "Principal": "*",
          "Action": "s3:GetObject",
          "Resource": { "Fn::Sub": format!("${{{bucket_id}.Arn}}/*") },
        }
      ]
    },
  })
}

fn distribution_properties(def: &HostingDef, bucket_id: &str) -> Value {
  let origin_id = "bucket-origin";
  let mut config = json!({
    "Enabled": true,
    "DefaultRootObject": def.bucket.website_index,
    "Origins": [
      {
        "Id": origin_id,
        "DomainName": { "Fn::GetAtt": [bucket_id, "RegionalDomainName"] },
        "S3OriginConfig": {},
      }
    ],
    "DefaultCacheBehavior": {
      "TargetOriginId": origin_id,
      "ViewerProtocolPolicy": "redirect-to-https",
      "ForwardedValues": { "QueryString": false },
    },
  });

  if let Some(comment) = &def.distribution.comment {
    config["Comment"] = json!(comment);
  }

  json!({ "DistributionConfig": config })
}
