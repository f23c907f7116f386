//! Implementation of the `stack info` command.
//!
//! Evaluates a config and summarizes the units it defines: hosting settings,
//! stage ordering and action run-orders.

use std::path::{Path, PathBuf};

use anyhow::Result;

use stacklua_lib::pipeline::{ActionDef, ActionKind};

use crate::output::{print_info, print_json, print_stat, truncate_hash};

pub fn cmd_info(config: &Path, secrets: Option<PathBuf>, json: bool) -> Result<()> {
  let manifest = super::evaluate(config, secrets)?;

  if json {
    return print_json(&manifest);
  }

  for (hash, def) in &manifest.hostings {
    print_info(&format!("hosting {} ({})", def.id, truncate_hash(&hash.0)));
    print_stat("website index", &def.bucket.website_index);
    print_stat("public read", &def.bucket.public_read.to_string());
    print_stat("cors methods", &def.bucket.cors.allowed_methods.join(", "));
    match &def.sync {
      Some(sync) => print_stat(
        "sync",
        &format!("{} ({})", sync.source, truncate_hash(&sync.fingerprint.0)),
      ),
      None => print_stat("sync", "none"),
    }
  }

  for (hash, def) in &manifest.pipelines {
    print_info(&format!("pipeline {} ({})", def.id, truncate_hash(&hash.0)));

    let stage_names: Vec<&str> = def.stages.iter().map(|s| s.name.as_str()).collect();
    print_stat("stages", &stage_names.join(" -> "));

    for stage in &def.stages {
      for action in &stage.actions {
        print_stat(
          &format!("{}/{}", stage.name, action.name),
          &describe_action(action),
        );
      }
    }
  }

  if manifest.unit_count() == 0 {
    print_info("config defines no units");
  }

  Ok(())
}

fn describe_action(action: &ActionDef) -> String {
  let what = match &action.kind {
    ActionKind::Source(source) => format!("github {}/{} @ {}", source.owner, source.repo, source.branch),
    ActionKind::Build(build) => format!("build ({})", build.artifact.base_dir),
    ActionKind::Deploy(_) => "deploy to bucket".to_string(),
    ActionKind::Invalidate(invalidate) => format!("invalidate {}", invalidate.paths.join(" ")),
  };

  let mut parts = vec![what];
  if let Some(order) = action.run_order {
    parts.push(format!("run {}", order));
  }
  if let Some(input) = &action.input {
    parts.push(format!("in: {}", input));
  }
  if !action.outputs.is_empty() {
    parts.push(format!("out: {}", action.outputs.join(", ")));
  }

  parts.join(", ")
}
