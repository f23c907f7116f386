//! Implementation of the `stack synth` command.
//!
//! Evaluates the config, synthesizes the template into the out directory and
//! records the manifest as the current snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use stacklua_lib::consts::TEMPLATE_FILENAME;
use stacklua_lib::paths::{out_dir, snapshots_dir};
use stacklua_lib::snapshot::{Snapshot, SnapshotStore, compute_diff};
use stacklua_lib::synth::synthesize;

use crate::output::{print_json, print_stat, print_success};

pub fn cmd_synth(config: &Path, secrets: Option<PathBuf>, json: bool) -> Result<()> {
  let manifest = super::evaluate(config, secrets)?;
  let template = synthesize(&manifest).context("failed to synthesize template")?;

  let dir = super::config_dir(config);
  let out = out_dir(dir);
  fs::create_dir_all(&out)
    .with_context(|| format!("failed to create out directory: {}", out.display()))?;

  let template_path = out.join(TEMPLATE_FILENAME);
  let mut content = template.to_json_pretty()?;
  content.push('\n');
  fs::write(&template_path, &content)
    .with_context(|| format!("failed to write template: {}", template_path.display()))?;
  tracing::debug!(path = %template_path.display(), "wrote template");

  let store = SnapshotStore::new(snapshots_dir(dir));
  let previous = store.load_current().context("failed to load current snapshot")?;
  let diff = compute_diff(&manifest, previous.as_ref().map(|s| &s.manifest));

  let snapshot = Snapshot::new(manifest.clone(), Some(config.to_path_buf()))?;
  store
    .save_and_set_current(&snapshot)
    .context("failed to record snapshot")?;

  if json {
    return print_json(&serde_json::json!({
      "template": template_path,
      "snapshot": snapshot.id,
      "resources": template.resources.len(),
      "outputs": template.outputs.len(),
      "changes": diff.change_count(),
    }));
  }

  print_success("synthesized");
  print_stat(
    "units",
    &format!(
      "{} hosting, {} pipeline",
      manifest.hostings.len(),
      manifest.pipelines.len()
    ),
  );
  print_stat("resources", &template.resources.len().to_string());
  print_stat("template", &template_path.display().to_string());
  print_stat("snapshot", &snapshot.id);
  if diff.is_empty() && previous.is_some() {
    print_stat("changes", "none since last synth");
  } else if previous.is_some() {
    print_stat("changes", &diff.change_count().to_string());
  }

  Ok(())
}
